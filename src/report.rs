//! HTML rendering of importance rankings.
//!
//! Generates a self-contained HTML file with embedded
//! [Plotly.js](https://plotly.com/javascript/) bar charts. Singleton
//! hyperparameters are drawn in ranked order; pairwise entries follow in
//! the order they were reported.

use core::fmt::Write as _;
use std::path::Path;

use crate::error::{Error, Result};
use crate::evaluator::ImportanceMap;

/// Writes an importance report for one evaluator run.
///
/// The first `num_singles` entries of `importance` are the ranked
/// singleton hyperparameters; the rest are pairwise entries.
pub(crate) fn write_importance_report(
    path: &Path,
    evaluator_name: &str,
    importance: &ImportanceMap,
    num_singles: usize,
) -> Result<()> {
    let html = build_html(evaluator_name, importance, num_singles);
    std::fs::write(path, html).map_err(|e| Error::Storage(e.to_string()))
}

fn build_html(evaluator_name: &str, importance: &ImportanceMap, num_singles: usize) -> String {
    let mut html = String::with_capacity(4096);

    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{evaluator_name} Importance</title>
<script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
<style>
  * {{ margin: 0; padding: 0; box-sizing: border-box; }}
  body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
         background: #f5f6fa; color: #2c3e50; padding: 24px; }}
  h1 {{ text-align: center; margin-bottom: 8px; font-size: 1.8em; }}
  .subtitle {{ text-align: center; color: #7f8c8d; margin-bottom: 24px; }}
  .chart {{ background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.08);
            margin-bottom: 24px; padding: 16px; }}
  .chart-title {{ font-size: 1.1em; font-weight: 600; margin-bottom: 8px; }}
</style>
</head>
<body>
<h1>{evaluator_name} Parameter Importance</h1>
<p class="subtitle">{n} ranked hyperparameters</p>
"#,
        n = num_singles,
    );

    let singles: Vec<(&str, f64)> = importance.iter().take(num_singles).collect();
    let pairs: Vec<(&str, f64)> = importance.iter().skip(num_singles).collect();

    html.push_str("<div class=\"chart\"><div class=\"chart-title\">Single Hyperparameters</div><div id=\"singles\"></div></div>\n");
    if !pairs.is_empty() {
        html.push_str("<div class=\"chart\"><div class=\"chart-title\">Pairwise Marginals</div><div id=\"pairs\"></div></div>\n");
    }

    html.push_str("<script>\n");
    push_bar_chart(&mut html, "singles", &singles);
    if !pairs.is_empty() {
        push_bar_chart(&mut html, "pairs", &pairs);
    }
    html.push_str("</script>\n</body>\n</html>\n");

    html
}

/// Emits one Plotly horizontal bar chart. Bars appear top-down in the
/// order given, so rank order is preserved visually.
fn push_bar_chart(html: &mut String, div_id: &str, entries: &[(&str, f64)]) {
    let labels: Vec<String> = entries.iter().map(|(k, _)| format!("{k:?}")).collect();
    let values: Vec<String> = entries.iter().map(|(_, v)| v.to_string()).collect();

    let _ = write!(
        html,
        "Plotly.newPlot({div_id:?}, [{{type: 'bar', orientation: 'h', \
         y: [{labels}], x: [{values}]}}], \
         {{margin: {{l: 160}}, yaxis: {{autorange: 'reversed'}}}});\n",
        labels = labels.join(", "),
        values = values.join(", "),
    );
}
