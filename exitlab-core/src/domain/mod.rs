//! Domain types for exitlab

pub mod candle;
pub(crate) mod duration_secs;
pub mod ids;
pub mod signal;
pub mod trade;

pub use candle::Candle;
pub use ids::{GroupId, IdGen, PositionId};
pub use signal::{Direction, Regime, Signal};
pub use trade::{ExitReason, TradeRecord};
