/// Data layer: table model, loading, and cleaning.
///
/// Architecture:
/// ```text
///   uploaded bytes
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  decode strategies → raw Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  cleaner  │  trim, drop empty columns, reparse timestamps
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   Table   │  uniquely named, equally long typed columns
///   └──────────┘
/// ```

pub mod cleaner;
pub mod loader;
pub mod model;
pub mod timestamp;
