//! The strategy form: what the user submits and the text the model sees.

use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNTITLED: &str = "Untitled Strategy";
pub const MISSING_CONDITION: &str = "Buy or Sell Condition must be provided.";

const NOT_SPECIFIED: &str = "Not specified";
const NONE: &str = "None";

fn require_buy_or_sell(sell_condition: &str) -> impl FnOnce(&String, &()) -> garde::Result + '_ {
    move |buy_condition: &String, (): &()| {
        if buy_condition.trim().is_empty() && sell_condition.trim().is_empty() {
            return Err(garde::Error::new(MISSING_CONDITION));
        }
        Ok(())
    }
}

/// A submitted strategy. Every field is optional on the wire and arrives as
/// free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StrategyForm {
    #[garde(skip)]
    pub strategy_name: String,
    #[garde(custom(require_buy_or_sell(&self.sell_condition)))]
    pub buy_condition: String,
    #[garde(skip)]
    pub sell_condition: String,
    #[garde(skip)]
    pub indicators: String,
    #[garde(skip)]
    pub position_sizing: String,
    #[garde(skip)]
    pub initial_cash: String,
    #[garde(skip)]
    pub commission: String,
    #[garde(skip)]
    pub data_source: String,
    #[garde(skip)]
    pub stop_loss: String,
    #[garde(skip)]
    pub other_constraints: String,
    #[garde(skip)]
    pub notes: String,
}

impl StrategyForm {
    /// Trim every field.
    #[must_use]
    pub fn normalized(self) -> Self {
        let t = |s: String| s.trim().to_string();
        Self {
            strategy_name: t(self.strategy_name),
            buy_condition: t(self.buy_condition),
            sell_condition: t(self.sell_condition),
            indicators: t(self.indicators),
            position_sizing: t(self.position_sizing),
            initial_cash: t(self.initial_cash),
            commission: t(self.commission),
            data_source: t(self.data_source),
            stop_loss: t(self.stop_loss),
            other_constraints: t(self.other_constraints),
            notes: t(self.notes),
        }
    }

    /// Validate; the only rule is that a buy or sell condition is present.
    pub fn check(&self) -> Result<(), String> {
        self.validate()
            .map_err(|report| {
                report
                    .iter()
                    .next()
                    .map_or_else(|| MISSING_CONDITION.to_string(), |(_, e)| e.message().to_string())
            })
    }

    pub fn display_name(&self) -> &str {
        let name = self.strategy_name.trim();
        if name.is_empty() {
            UNTITLED
        } else {
            name
        }
    }

    /// Field name → submitted value, for re-rendering the form.
    pub fn values(&self) -> BTreeMap<&'static str, &str> {
        BTreeMap::from([
            ("strategy_name", self.strategy_name.as_str()),
            ("buy_condition", self.buy_condition.as_str()),
            ("sell_condition", self.sell_condition.as_str()),
            ("indicators", self.indicators.as_str()),
            ("position_sizing", self.position_sizing.as_str()),
            ("initial_cash", self.initial_cash.as_str()),
            ("commission", self.commission.as_str()),
            ("data_source", self.data_source.as_str()),
            ("stop_loss", self.stop_loss.as_str()),
            ("other_constraints", self.other_constraints.as_str()),
            ("notes", self.notes.as_str()),
        ])
    }

    /// The structured description handed to the model.
    pub fn describe(&self) -> String {
        let or = |value: &str, fallback: &'static str| -> String {
            let value = value.trim();
            if value.is_empty() {
                fallback.to_string()
            } else {
                value.to_string()
            }
        };
        [
            format!("Strategy Name: {}", self.display_name()),
            format!("Buy Condition: {}", or(&self.buy_condition, NOT_SPECIFIED)),
            format!("Sell Condition: {}", or(&self.sell_condition, NOT_SPECIFIED)),
            format!("Indicators: {}", or(&self.indicators, NOT_SPECIFIED)),
            format!("Position Sizing: {}", or(&self.position_sizing, NOT_SPECIFIED)),
            format!("Initial Cash: {}", or(&self.initial_cash, NOT_SPECIFIED)),
            format!("Commission: {}", or(&self.commission, NOT_SPECIFIED)),
            format!("Data Source: {}", or(&self.data_source, NOT_SPECIFIED)),
            format!("Stop Loss: {}", or(&self.stop_loss, NOT_SPECIFIED)),
            format!("Other Constraints: {}", or(&self.other_constraints, NONE)),
            format!("Notes: {}", or(&self.notes, NONE)),
        ]
        .join("\n")
    }
}
