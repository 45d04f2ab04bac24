use serde_json::Value;
use tracing::warn;

use crate::driver::PageDriver;

/// Resolves with the rendered `outerHTML` once the DOM is ready.
pub(crate) const EXTRACT_HTML_JS: &str = r#"
new Promise((resolve) => {
  if (document.readyState === 'complete' || document.readyState === 'interactive') {
    resolve(document.documentElement.outerHTML);
  } else {
    window.addEventListener('DOMContentLoaded', () => {
      resolve(document.documentElement.outerHTML);
    });
  }
})
"#;

/// Walks every text node under `<body>` in document order.
/// Returned as a JSON string so arrays survive the by-reference evaluate.
pub(crate) const TEXT_LINES_JS: &str = r#"
(() => {
  const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT, null, false);
  const texts = [];
  let node;
  while ((node = walker.nextNode())) {
    const trimmed = node.textContent.trim();
    if (trimmed) texts.push(trimmed);
  }
  return JSON.stringify(texts);
})()
"#;

/// Full rendered HTML of the tab, or `None` if the page could not be read.
pub async fn extract_html(page: &dyn PageDriver) -> Option<String> {
    match page.evaluate(EXTRACT_HTML_JS, true).await {
        Ok(Some(Value::String(html))) => Some(html),
        Ok(other) => {
            warn!("HTML extraction returned no string: {:?}", other);
            None
        }
        Err(e) => {
            warn!("HTML extraction failed: {}", e);
            None
        }
    }
}

/// Visible text lines of the tab, or `None` if the page could not be read.
pub async fn extract_text_lines(page: &dyn PageDriver) -> Option<Vec<String>> {
    let raw = match page.evaluate(TEXT_LINES_JS, false).await {
        Ok(Some(Value::String(raw))) => raw,
        Ok(other) => {
            warn!("text extraction returned no string: {:?}", other);
            return None;
        }
        Err(e) => {
            warn!("text extraction failed: {}", e);
            return None;
        }
    };

    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(lines) => Some(normalize_lines(lines)),
        Err(e) => {
            warn!("text extraction returned invalid JSON: {}", e);
            None
        }
    }
}

fn normalize_lines(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
