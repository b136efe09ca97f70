//! HTTP routes: the strategy form, its JSON twin, and media/static serving.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::execute::Runner;
use crate::form::StrategyForm;
use crate::generate::{generate_strategy_code, CodeGenerator};
use crate::response::{BacktestResponse, ErrorResponse};
use crate::views;

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn CodeGenerator>,
    pub runner: Arc<Runner>,
    pub media_url: String,
}

impl AppState {
    pub fn new(generator: Arc<dyn CodeGenerator>, runner: Arc<Runner>, media_url: &str) -> Self {
        Self {
            generator,
            runner,
            media_url: media_url.to_string(),
        }
    }

    pub fn from_config(generator: Arc<dyn CodeGenerator>, config: &Config) -> Self {
        Self::new(
            generator,
            Arc::new(Runner::from_config(config)),
            &config.media_url,
        )
    }
}

/// A submission that failed validation, handed back for re-rendering.
#[derive(Debug)]
pub struct Rejected {
    pub form: StrategyForm,
    pub message: String,
}

/// Validate, generate, execute. Only validation can fail; generation and
/// execution problems end up in the report.
pub async fn run_strategy(
    state: &AppState,
    form: StrategyForm,
) -> Result<BacktestResponse, Rejected> {
    let form = form.normalized();
    if let Err(message) = form.check() {
        tracing::info!("Rejected strategy submission: {message}");
        return Err(Rejected { form, message });
    }

    let strategy_name = form.display_name().to_string();
    tracing::info!(strategy = %strategy_name, "Generating backtest");

    let code = generate_strategy_code(state.generator.as_ref(), &form.describe()).await;
    let result = state.runner.run(&code, &strategy_name).await;
    let plot_url = result.plot_url(state.runner.media_root(), &state.media_url);

    Ok(BacktestResponse {
        strategy_name,
        report: result.report,
        plot_url,
        code,
    })
}

async fn index() -> Html<String> {
    Html(views::render_index())
}

async fn strategy_form() -> Html<String> {
    Html(views::render_strategy_form(None, &StrategyForm::default()))
}

async fn strategy_submit(
    State(state): State<AppState>,
    Form(form): Form<StrategyForm>,
) -> Html<String> {
    match run_strategy(&state, form).await {
        Ok(page) => Html(views::render_results(&page)),
        Err(Rejected { form, message }) => {
            Html(views::render_strategy_form(Some(message.as_str()), &form))
        }
    }
}

async fn strategy_api(State(state): State<AppState>, Json(form): Json<StrategyForm>) -> Response {
    match run_strategy(&state, form).await {
        Ok(page) => Json(page).into_response(),
        Err(Rejected { message, .. }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse { error: message }),
        )
            .into_response(),
    }
}

fn mount_path(url: &str, fallback: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.is_empty() {
        fallback.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

pub fn router(state: AppState, static_root: &Path) -> Router {
    let media = ServeDir::new(state.runner.media_root());
    let media_path = mount_path(&state.media_url, "/media");

    let api = Router::new()
        .route("/api/strategy", post(strategy_api))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/", get(index))
        .route("/strategy/", get(strategy_form).post(strategy_submit))
        .route("/health", get(|| async { "ok" }))
        .merge(api)
        .nest_service(&media_path, media)
        .nest_service("/static", ServeDir::new(static_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_path_normalizes() {
        assert_eq!(mount_path("/media/", "/media"), "/media");
        assert_eq!(mount_path("charts", "/media"), "/charts");
        assert_eq!(mount_path("/", "/media"), "/media");
    }
}
