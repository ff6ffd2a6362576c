//! Writes sample CSV files that exercise every chart type:
//!
//! - `marks.csv`: scores 30–100 per subject for roll numbers 101–178
//! - `attendance.csv`: attendance 50–100% per subject, same roll numbers
//! - `sales.csv`: daily sales per region and product for 2024
//!
//! Usage: `generate_sample [OUTPUT_DIR]` (defaults to the current directory).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use log::info;

const SUBJECTS: [&str; 5] = ["Math", "Physics", "Chemistry", "English", "CS"];
const ROLL_NUMBERS: std::ops::RangeInclusive<u32> = 101..=178;
const REGIONS: [&str; 4] = ["North", "South", "East", "West"];
const PRODUCTS: [(&str, f64); 3] = [("Widget", 12.5), ("Gadget", 30.0), ("Gizmo", 7.25)];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `lo..=hi`.
    fn int_in(&mut self, lo: u32, hi: u32) -> u32 {
        lo + (self.next_u64() % u64::from(hi - lo + 1)) as u32
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// One row per roll number, one random score per subject.
fn write_scores(path: &Path, rng: &mut SimpleRng, lo: u32, hi: u32) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["Roll No"];
    header.extend(SUBJECTS);
    writer.write_record(&header)?;

    for roll in ROLL_NUMBERS {
        let mut record = vec![roll.to_string()];
        record.extend(SUBJECTS.iter().map(|_| rng.int_in(lo, hi).to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(ROLL_NUMBERS.count())
}

fn write_sales(path: &Path, rng: &mut SimpleRng) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["date", "region", "product", "units", "sales"])?;

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid start date")?;
    let mut rows = 0;
    for day in 0..366 {
        let date = start + Duration::days(day);
        // Mild yearly seasonality so the line chart has a shape.
        let season = 1.0 + 0.3 * (day as f64 / 366.0 * std::f64::consts::TAU).sin();
        for region in REGIONS {
            // Not every region sells every product every day.
            let (product, price) = PRODUCTS[rng.int_in(0, PRODUCTS.len() as u32 - 1) as usize];
            let units = (rng.gauss(20.0 * season, 6.0).round() as i64).max(0);
            let sales = (units as f64 * price * rng.gauss(1.0, 0.05) * 100.0).round() / 100.0;
            writer.write_record([
                date.format("%Y-%m-%d").to_string(),
                region.to_string(),
                product.to_string(),
                units.to_string(),
                format!("{sales:.2}"),
            ])?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let files: [(&str, fn(&Path, &mut SimpleRng) -> Result<usize>); 3] = [
        ("marks.csv", |p, rng| write_scores(p, rng, 30, 100)),
        ("attendance.csv", |p, rng| write_scores(p, rng, 50, 100)),
        ("sales.csv", write_sales),
    ];

    for (name, write) in files {
        let path = out_dir.join(name);
        let rows = write(&path, &mut rng).with_context(|| format!("writing {}", path.display()))?;
        info!("generated {name}");
        println!("Wrote {rows} rows to {}", path.display());
    }
    Ok(())
}
