use serde::{Deserialize, Serialize};

/// Everything the results page shows. Also the JSON body of `/api/strategy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestResponse {
    pub strategy_name: String,
    /// Console output of the run, or the error that replaced it.
    pub report: String,
    /// Chart URL, present only when the script actually wrote the file.
    pub plot_url: Option<String>,
    /// Generated source as returned by the model (before the show rewrite).
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
