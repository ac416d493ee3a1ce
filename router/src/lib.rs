pub mod algo;
pub mod assembler;
pub mod error;
pub mod frame;
pub mod lead;
pub mod length;
pub mod meander;
pub mod net_router;
pub mod obstacles;
pub mod result;
pub mod router;
pub mod simple;
pub mod spec;
pub mod utils;

use qroute_common::db::core::ChipDesign;
use qroute_common::util::config::Config;

pub use net_router::RoutingSummary;
pub use router::Router;

pub fn route(db: &mut ChipDesign, config: &Config) -> Result<RoutingSummary, String> {
    net_router::run(db, config)
}
