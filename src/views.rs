//! HTML pages.
//!
//! Pages are assembled with `format!`; every piece of user or model text goes
//! through [`escape`] first.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::form::StrategyForm;
use crate::response::BacktestResponse;

const STYLESHEET: &str = "/static/backtest.css";

enum Widget {
    Line,
    Area,
}

/// (field, label, widget, placeholder)
const FORM_FIELDS: &[(&str, &str, Widget, &str)] = &[
    ("strategy_name", "Strategy name", Widget::Line, "Untitled Strategy"),
    ("buy_condition", "Buy condition", Widget::Area, "e.g. 50-day SMA crosses above 200-day SMA"),
    ("sell_condition", "Sell condition", Widget::Area, "e.g. RSI(14) rises above 70"),
    ("indicators", "Indicators", Widget::Area, "e.g. SMA(50), SMA(200), RSI(14)"),
    ("position_sizing", "Position sizing", Widget::Line, "e.g. 10% of equity per trade"),
    ("initial_cash", "Initial cash", Widget::Line, "e.g. 10000"),
    ("commission", "Commission", Widget::Line, "e.g. 0.001"),
    ("data_source", "Data source", Widget::Line, "e.g. AAPL daily, 2018-2023"),
    ("stop_loss", "Stop loss", Widget::Line, "e.g. 5% below entry"),
    ("other_constraints", "Other constraints", Widget::Area, ""),
    ("notes", "Notes", Widget::Area, ""),
];

#[derive(Debug, thiserror::Error)]
#[error("replace expects exactly one comma in \"old,new\", got {0:?}")]
pub struct ReplaceArgsError(String);

/// Look up `key` in a field map.
pub fn get_item<'a>(map: &BTreeMap<&str, &'a str>, key: &str) -> Option<&'a str> {
    map.get(key).copied()
}

/// Replace every `old` with `new`, where `args` is `"old,new"`.
pub fn replace(value: &str, args: &str) -> Result<String, ReplaceArgsError> {
    let mut parts = args.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(old), Some(new), None) => Ok(value.replace(old, new)),
        _ => Err(ReplaceArgsError(args.to_string())),
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} · Rewind</title>\n\
         <link rel=\"stylesheet\" href=\"{STYLESHEET}\">\n\
         </head>\n\
         <body>\n\
         <nav><a href=\"/\">Rewind</a> <a href=\"/strategy/\">New strategy</a></nav>\n\
         <main>\n{body}</main>\n\
         </body>\n\
         </html>\n",
        title = escape(title),
    )
}

pub fn render_index() -> String {
    layout(
        "Home",
        "<h1>Rewind</h1>\n\
         <p>Describe a trading strategy in plain words. Rewind writes the backtest, \
         runs it against historical prices, and shows you the results.</p>\n\
         <p><a class=\"button\" href=\"/strategy/\">Describe a strategy</a></p>\n",
    )
}

/// The strategy form, optionally with an inline error and the values the
/// user already typed.
pub fn render_strategy_form(error: Option<&str>, form: &StrategyForm) -> String {
    let values = form.values();
    let mut body = String::from("<h1>Describe your strategy</h1>\n");
    if let Some(error) = error {
        let _ = writeln!(body, "<p class=\"error\" role=\"alert\">{}</p>", escape(error));
    }
    body.push_str("<form method=\"post\" action=\"/strategy/\">\n");
    for (name, label, widget, placeholder) in FORM_FIELDS {
        let value = escape(get_item(&values, name).unwrap_or_default());
        let placeholder = escape(placeholder);
        let _ = writeln!(body, "<label for=\"{name}\">{label}</label>");
        let _ = match widget {
            Widget::Line => writeln!(
                body,
                "<input type=\"text\" id=\"{name}\" name=\"{name}\" value=\"{value}\" placeholder=\"{placeholder}\">"
            ),
            Widget::Area => writeln!(
                body,
                "<textarea id=\"{name}\" name=\"{name}\" rows=\"3\" placeholder=\"{placeholder}\">{value}</textarea>"
            ),
        };
    }
    body.push_str("<button type=\"submit\">Generate &amp; run backtest</button>\n</form>\n");
    layout("Strategy", &body)
}

pub fn render_results(page: &BacktestResponse) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", escape(&page.strategy_name));

    body.push_str("<section>\n<h2>Report</h2>\n");
    if page.report.trim().is_empty() {
        body.push_str("<p class=\"muted\">The backtest produced no output.</p>\n");
    } else {
        let _ = writeln!(body, "<pre class=\"report\">{}</pre>", escape(&page.report));
    }
    body.push_str("</section>\n");

    if let Some(url) = &page.plot_url {
        let _ = writeln!(
            body,
            "<section>\n<h2>Chart</h2>\n<img src=\"{}\" alt=\"Backtest chart for {}\">\n</section>",
            escape(url),
            escape(&page.strategy_name)
        );
    }

    let code = replace(&page.code, "\t,    ").unwrap_or_else(|_| page.code.clone());
    let _ = writeln!(
        body,
        "<section>\n<h2>Generated code</h2>\n<pre class=\"code\"><code>{}</code></pre>\n</section>",
        escape(&code)
    );
    body.push_str("<p><a href=\"/strategy/\">Try another strategy</a></p>\n");

    layout(&page.strategy_name, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(plot_url: Option<&str>) -> BacktestResponse {
        BacktestResponse {
            strategy_name: "Golden <Cross>".into(),
            report: "Final Portfolio Value: 10500.00".into(),
            plot_url: plot_url.map(str::to_string),
            code: "def next(self):\n\tif self.sma > 0:\n\t\tself.buy()".into(),
        }
    }

    #[test]
    fn escape_covers_html_specials() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn replace_filter() {
        assert_eq!(replace("a-b-c", "-,+").unwrap(), "a+b+c");
        assert_eq!(replace("a-b", "-,").unwrap(), "ab");
        assert!(replace("a", "nocomma").is_err());
        assert!(replace("a", "a,b,c").is_err());
    }

    #[test]
    fn get_item_lookup() {
        let map = BTreeMap::from([("buy_condition", "x")]);
        assert_eq!(get_item(&map, "buy_condition"), Some("x"));
        assert_eq!(get_item(&map, "sell_condition"), None);
    }

    #[test]
    fn form_shows_error_and_keeps_values() {
        let form = StrategyForm {
            strategy_name: "My \"best\" idea".into(),
            notes: "<script>".into(),
            ..StrategyForm::default()
        };
        let html = render_strategy_form(Some("Buy or Sell Condition must be provided."), &form);
        assert!(html.contains("class=\"error\""));
        assert!(html.contains("Buy or Sell Condition must be provided."));
        assert!(html.contains("value=\"My &quot;best&quot; idea\""));
        assert!(html.contains("&lt;script&gt;</textarea>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn blank_form_has_every_field_and_no_error() {
        let html = render_strategy_form(None, &StrategyForm::default());
        assert!(!html.contains("class=\"error\""));
        for (name, ..) in FORM_FIELDS {
            assert!(html.contains(&format!("name=\"{name}\"")), "missing {name}");
        }
    }

    #[test]
    fn results_without_plot_has_no_img() {
        let html = render_results(&page(None));
        assert!(html.contains("Golden &lt;Cross&gt;"));
        assert!(html.contains("Final Portfolio Value: 10500.00"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn results_with_plot_and_expanded_tabs() {
        let html = render_results(&page(Some("/media/abc.png")));
        assert!(html.contains("<img src=\"/media/abc.png\""));
        assert!(html.contains("\n    if self.sma &gt; 0:\n        self.buy()"));
    }

    #[test]
    fn empty_report_says_so() {
        let mut p = page(None);
        p.report = "  \n".into();
        assert!(render_results(&p).contains("produced no output"));
    }
}
