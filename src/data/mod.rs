pub mod loader;
pub mod types;

pub use loader::{DataLoader, LoaderError, REQUIRED_COLUMNS};
pub use types::{pct_change, PriceBar, PriceField, PriceSeries, ReturnSeries, Universe};
