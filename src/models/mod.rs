//! Data models for bars, orders, positions, the market clock and stream events.

mod bar;
mod clock;
mod event;
mod order;
mod position;

pub use bar::Bar;
pub use clock::MarketClock;
pub use event::{StreamEvent, TradeEvent, TradeUpdate};
pub use order::{Order, OrderKind, OrderRequest, OrderSide};
pub use position::Position;
