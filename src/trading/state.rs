//! Per-symbol trading state and its transition table.
//!
//! Every state change a trader makes goes through [`transition`], which maps
//! `(state, event, guards)` to the state to enter and the action to perform.
//! Submissions move on to the matching `*Submitted` state only once the
//! brokerage accepts the order; on failure the trader stays in the state
//! returned here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Order, OrderSide, Position};

/// Lifecycle of one order round trip for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingState {
    /// Flat, waiting for a buy signal
    ToBuy,
    /// Buy order working
    BuySubmitted,
    /// Holding shares with no sell order working
    ToSell,
    /// Sell order working
    SellSubmitted,
}

impl TradingState {
    /// State entered once an order submitted from this state is accepted.
    pub fn after_submit(self) -> TradingState {
        match self {
            TradingState::ToBuy | TradingState::BuySubmitted => TradingState::BuySubmitted,
            TradingState::ToSell | TradingState::SellSubmitted => TradingState::SellSubmitted,
        }
    }

    /// Infer the state from what the brokerage currently holds for a symbol.
    ///
    /// Returns the state and, when the working order's side disagrees with
    /// it, the side that was expected.
    pub fn recover(
        order: Option<&Order>,
        position: Option<&Position>,
    ) -> (TradingState, Option<OrderSide>) {
        let (state, expected) = match (position.is_some(), order.is_some()) {
            (true, false) => (TradingState::ToSell, None),
            (true, true) => (TradingState::SellSubmitted, Some(OrderSide::Sell)),
            (false, false) => (TradingState::ToBuy, None),
            (false, true) => (TradingState::BuySubmitted, Some(OrderSide::Buy)),
        };

        let mismatch = match (order, expected) {
            (Some(order), Some(side)) if order.side != side => Some(side),
            _ => None,
        };

        (state, mismatch)
    }
}

impl fmt::Display for TradingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradingState::ToBuy => "TO_BUY",
            TradingState::BuySubmitted => "BUY_SUBMITTED",
            TradingState::ToSell => "TO_SELL",
            TradingState::SellSubmitted => "SELL_SUBMITTED",
        };
        f.write_str(s)
    }
}

/// Inputs that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraderEvent {
    /// A bar arrived inside the entry window and the crossover fired.
    BuySignal,
    /// The working order filled completely.
    Fill,
    /// The working order filled partially.
    PartialFill,
    /// The working order was canceled or expired.
    Canceled,
    /// The working order was rejected after acceptance.
    Rejected,
    /// Checkup found the working buy order older than the stale limit.
    StaleBuyOrder,
    /// Checkup found the session about to close while holding shares.
    ClosingSoon,
    /// Checkup found no position although one was expected.
    PositionLost,
}

/// Conditions evaluated by the trader before consulting the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guards {
    /// Shares are currently held.
    pub position_held: bool,
    /// The session closes within the closing buffer.
    pub closing_soon: bool,
    /// The working order is already a market sell.
    pub bailout_working: bool,
}

/// Effect of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do; the event is expected but needs no reaction.
    Ignore,
    /// The event makes no sense in the current state; log it.
    Unexpected,
    /// Place a limit buy sized from the lot.
    SubmitBuy,
    /// Place a sell for the whole position.
    SubmitSell { bailout: bool },
    /// Buy filled: load the position, then place the exit.
    OpenPosition,
    /// Sell filled: forget the position and the order.
    ClosePosition,
    /// Forget the dead order.
    ForgetOrder,
    /// Forget a position the brokerage no longer reports.
    ForgetPosition,
    /// Reload order and position from the brokerage.
    Refresh,
    /// Ask the brokerage to cancel the working order.
    CancelOrder,
}

/// Result of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: TradingState,
    pub action: Action,
}

impl Transition {
    fn to(next: TradingState, action: Action) -> Self {
        Self { next, action }
    }

    fn stay(state: TradingState, action: Action) -> Self {
        Self { next: state, action }
    }
}

/// The dispatch table.
pub fn transition(state: TradingState, event: TraderEvent, guards: Guards) -> Transition {
    use Action::*;
    use TraderEvent as E;
    use TradingState::*;

    match (state, event) {
        (ToBuy, E::BuySignal) => Transition::stay(ToBuy, SubmitBuy),
        (_, E::BuySignal) => Transition::stay(state, Ignore),

        (BuySubmitted, E::Fill) => Transition::to(ToSell, OpenPosition),
        (SellSubmitted, E::Fill) => Transition::to(ToBuy, ClosePosition),

        (BuySubmitted | SellSubmitted, E::PartialFill) => Transition::stay(state, Refresh),

        (BuySubmitted, E::Canceled | E::Rejected) if guards.position_held => Transition::to(
            ToSell,
            SubmitSell {
                bailout: guards.closing_soon,
            },
        ),
        (BuySubmitted, E::Canceled | E::Rejected) => Transition::to(ToBuy, ForgetOrder),
        (SellSubmitted, E::Canceled | E::Rejected) => {
            Transition::to(ToSell, SubmitSell { bailout: true })
        }

        (ToBuy | ToSell, E::Fill | E::PartialFill | E::Canceled | E::Rejected) => {
            Transition::stay(state, Unexpected)
        }

        (_, E::StaleBuyOrder) => Transition::stay(state, CancelOrder),

        (ToSell, E::ClosingSoon) => Transition::stay(ToSell, SubmitSell { bailout: true }),
        (ToBuy, E::ClosingSoon) if guards.position_held => {
            Transition::to(ToSell, SubmitSell { bailout: true })
        }
        (ToBuy, E::ClosingSoon) => Transition::stay(ToBuy, Ignore),
        (SellSubmitted, E::ClosingSoon) if guards.bailout_working => {
            Transition::stay(SellSubmitted, Ignore)
        }
        // Cancel first; the cancel notification resubmits as a bailout.
        (SellSubmitted | BuySubmitted, E::ClosingSoon) => Transition::stay(state, CancelOrder),

        (ToSell, E::PositionLost) => Transition::to(ToBuy, ForgetPosition),
        (_, E::PositionLost) => Transition::stay(state, Ignore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderKind, OrderSide};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const ALL_STATES: [TradingState; 4] = [
        TradingState::ToBuy,
        TradingState::BuySubmitted,
        TradingState::ToSell,
        TradingState::SellSubmitted,
    ];

    fn make_order(side: OrderSide) -> Order {
        Order {
            id: "o-1".to_string(),
            client_order_id: None,
            symbol: "AAPL".to_string(),
            side,
            kind: OrderKind::Limit,
            qty: dec!(10),
            filled_qty: Decimal::ZERO,
            filled_avg_price: None,
            limit_price: Some(dec!(10)),
            submitted_at: Utc::now(),
            status: "new".to_string(),
        }
    }

    #[test]
    fn test_order_events_unexpected_when_no_order_outstanding() {
        let events = [
            TraderEvent::Fill,
            TraderEvent::PartialFill,
            TraderEvent::Canceled,
            TraderEvent::Rejected,
        ];

        for state in [TradingState::ToBuy, TradingState::ToSell] {
            for event in events {
                for position_held in [false, true] {
                    let guards = Guards {
                        position_held,
                        ..Guards::default()
                    };
                    let t = transition(state, event, guards);
                    assert_eq!(t.action, Action::Unexpected, "{state} {event:?}");
                    assert_eq!(t.next, state);
                }
            }
        }
    }

    #[test]
    fn test_buy_signal_only_acts_in_to_buy() {
        for state in ALL_STATES {
            let t = transition(state, TraderEvent::BuySignal, Guards::default());
            assert_eq!(t.next, state);
            if state == TradingState::ToBuy {
                assert_eq!(t.action, Action::SubmitBuy);
            } else {
                assert_eq!(t.action, Action::Ignore);
            }
        }
    }

    #[test]
    fn test_fill_transitions() {
        let t = transition(TradingState::BuySubmitted, TraderEvent::Fill, Guards::default());
        assert_eq!(t, Transition::to(TradingState::ToSell, Action::OpenPosition));

        let t = transition(TradingState::SellSubmitted, TraderEvent::Fill, Guards::default());
        assert_eq!(t, Transition::to(TradingState::ToBuy, Action::ClosePosition));
    }

    #[test]
    fn test_partial_fill_refreshes_only() {
        for state in [TradingState::BuySubmitted, TradingState::SellSubmitted] {
            let t = transition(state, TraderEvent::PartialFill, Guards::default());
            assert_eq!(t, Transition::stay(state, Action::Refresh));
        }
    }

    #[test]
    fn test_buy_cancel_depends_on_position() {
        let held = Guards {
            position_held: true,
            ..Guards::default()
        };
        let t = transition(TradingState::BuySubmitted, TraderEvent::Canceled, held);
        assert_eq!(t.next, TradingState::ToSell);
        assert_eq!(t.action, Action::SubmitSell { bailout: false });

        let held_closing = Guards {
            position_held: true,
            closing_soon: true,
            ..Guards::default()
        };
        let t = transition(TradingState::BuySubmitted, TraderEvent::Rejected, held_closing);
        assert_eq!(t.action, Action::SubmitSell { bailout: true });

        let t = transition(
            TradingState::BuySubmitted,
            TraderEvent::Canceled,
            Guards::default(),
        );
        assert_eq!(t, Transition::to(TradingState::ToBuy, Action::ForgetOrder));
    }

    #[test]
    fn test_sell_cancel_resubmits_bailout() {
        for event in [TraderEvent::Canceled, TraderEvent::Rejected] {
            let t = transition(TradingState::SellSubmitted, event, Guards::default());
            assert_eq!(t.next, TradingState::ToSell);
            assert_eq!(t.action, Action::SubmitSell { bailout: true });
            assert_eq!(t.next.after_submit(), TradingState::SellSubmitted);
        }
    }

    #[test]
    fn test_stale_buy_cancels_without_state_change() {
        for state in ALL_STATES {
            let t = transition(state, TraderEvent::StaleBuyOrder, Guards::default());
            assert_eq!(t, Transition::stay(state, Action::CancelOrder));
        }
    }

    #[test]
    fn test_closing_soon() {
        let held = Guards {
            position_held: true,
            closing_soon: true,
            ..Guards::default()
        };

        let t = transition(TradingState::ToSell, TraderEvent::ClosingSoon, held);
        assert_eq!(t.action, Action::SubmitSell { bailout: true });
        assert_eq!(t.next.after_submit(), TradingState::SellSubmitted);

        let t = transition(TradingState::ToBuy, TraderEvent::ClosingSoon, held);
        assert_eq!(t, Transition::to(TradingState::ToSell, Action::SubmitSell { bailout: true }));

        let t = transition(TradingState::SellSubmitted, TraderEvent::ClosingSoon, held);
        assert_eq!(t.action, Action::CancelOrder);

        let bailing = Guards {
            bailout_working: true,
            ..held
        };
        let t = transition(TradingState::SellSubmitted, TraderEvent::ClosingSoon, bailing);
        assert_eq!(t.action, Action::Ignore);
    }

    #[test]
    fn test_position_lost_only_resets_to_sell() {
        let t = transition(TradingState::ToSell, TraderEvent::PositionLost, Guards::default());
        assert_eq!(t, Transition::to(TradingState::ToBuy, Action::ForgetPosition));

        let t = transition(
            TradingState::SellSubmitted,
            TraderEvent::PositionLost,
            Guards::default(),
        );
        assert_eq!(t.action, Action::Ignore);
    }

    #[test]
    fn test_recover_all_combinations() {
        let position = Position::new("AAPL", dec!(10), dec!(100));
        let buy = make_order(OrderSide::Buy);
        let sell = make_order(OrderSide::Sell);

        assert_eq!(
            TradingState::recover(None, Some(&position)),
            (TradingState::ToSell, None)
        );
        assert_eq!(
            TradingState::recover(Some(&sell), Some(&position)),
            (TradingState::SellSubmitted, None)
        );
        assert_eq!(TradingState::recover(None, None), (TradingState::ToBuy, None));
        assert_eq!(
            TradingState::recover(Some(&buy), None),
            (TradingState::BuySubmitted, None)
        );
    }

    #[test]
    fn test_recover_reports_side_mismatch() {
        let position = Position::new("AAPL", dec!(10), dec!(100));
        let buy = make_order(OrderSide::Buy);
        let sell = make_order(OrderSide::Sell);

        assert_eq!(
            TradingState::recover(Some(&buy), Some(&position)),
            (TradingState::SellSubmitted, Some(OrderSide::Sell))
        );
        assert_eq!(
            TradingState::recover(Some(&sell), None),
            (TradingState::BuySubmitted, Some(OrderSide::Buy))
        );
    }
}
