//! Local coverage report (Cobertura `coverage.xml`) reader.

use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

/// Line coverage in percent from the root element's `line-rate` attribute.
///
/// Never fails: a missing or unreadable report counts as 0% coverage.
pub fn parse_coverage(path: &Path) -> f64 {
  if !path.exists() {
    tracing::warn!(
      "Coverage file '{}' not found. Defaulting to 0 coverage.",
      path.display()
    );
    return 0.0;
  }

  let xml = match fs::read_to_string(path) {
    Ok(s) => s,
    Err(e) => {
      tracing::warn!("Could not read {}. Defaulting to 0 coverage. Error: {}", path.display(), e);
      return 0.0;
    }
  };

  match line_rate_percent(&xml) {
    Ok(percent) => percent,
    Err(e) => {
      tracing::warn!("Could not parse {}. Defaulting to 0 coverage. Error: {}", path.display(), e);
      0.0
    }
  }
}

/// A root element without `line-rate` means 0%. The whole document must be
/// well-formed, not just the root tag: every element closed, one root only.
fn line_rate_percent(xml: &str) -> Result<f64, String> {
  let mut reader = Reader::from_str(xml);
  let mut rate: Option<f64> = None;
  let mut depth: usize = 0;

  loop {
    match reader.read_event().map_err(|e| e.to_string())? {
      Event::Start(e) | Event::Empty(e) if depth == 0 && rate.is_some() => {
        return Err(format!(
          "second root element <{}>",
          String::from_utf8_lossy(e.name().as_ref())
        ));
      }
      Event::Start(e) => {
        if depth == 0 {
          rate = Some(root_line_rate(&e)?);
        }
        depth += 1;
      }
      Event::Empty(e) => {
        if depth == 0 {
          rate = Some(root_line_rate(&e)?);
        }
      }
      Event::End(_) => {
        depth = depth.checked_sub(1).ok_or("unexpected closing tag")?;
      }
      Event::Eof => break,
      _ => {}
    }
  }

  if depth != 0 {
    return Err(format!("truncated document: {} unclosed element(s)", depth));
  }
  rate
    .map(|r| round2(r * 100.0))
    .ok_or_else(|| "no root element".to_string())
}

fn root_line_rate(root: &BytesStart<'_>) -> Result<f64, String> {
  match root.try_get_attribute("line-rate").map_err(|e| e.to_string())? {
    Some(attr) => {
      let raw = String::from_utf8_lossy(&attr.value).trim().to_string();
      raw
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid line-rate {:?}", raw))
    }
    None => Ok(0.0),
  }
}
