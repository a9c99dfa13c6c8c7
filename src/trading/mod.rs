//! Trading core: bar history, crossover signal, order/position snapshot,
//! session clock, the per-symbol state machine and the fleet dispatcher.

mod bar_series;
mod config;
mod fleet;
mod session;
mod signal;
mod sizing;
mod snapshot;
mod state;
mod trader;

pub use bar_series::BarSeries;
pub use config::StrategyConfig;
pub use fleet::{take_position, take_working_order, FleetDispatcher, FleetEvent};
pub use session::SessionClock;
pub use signal::SignalEvaluator;
pub use snapshot::OrderSnapshot;
pub use state::TradingState;
pub use trader::SymbolTrader;
