use anyhow::{Context, Result};
use std::path::Path;

use crate::signal::RRSeries;

/// RR intervals in milliseconds, one or more per line separated by
/// whitespace or commas. `#` starts a comment.
pub fn parse_rri_series(text: &str) -> Result<RRSeries> {
    let mut rr = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or_default();
        for field in content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
        {
            let ms: f64 = field
                .parse()
                .with_context(|| format!("line {}: {:?} is not a number", idx + 1, field))?;
            if !(ms.is_finite() && ms > 0.0) {
                anyhow::bail!("line {}: RR interval must be positive, got {}", idx + 1, ms);
            }
            rr.push(ms);
        }
    }
    if rr.is_empty() {
        anyhow::bail!("no RR intervals found");
    }
    Ok(RRSeries::new(rr))
}

pub fn read_rri_series(path: &Path) -> Result<RRSeries> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_rri_series(&text).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lines_commas_and_comments() {
        let rr = parse_rri_series("# rri ms\n812, 790.5\n\n  805 # late beat\n").expect("parse");
        assert_eq!(rr.rr, vec![812.0, 790.5, 805.0]);
    }

    #[test]
    fn reports_offending_line() {
        let err = parse_rri_series("800\nabc\n").expect_err("should fail");
        assert!(err.to_string().contains("line 2"));
        assert!(parse_rri_series("800\n-5\n").is_err());
        assert!(parse_rri_series("# nothing\n").is_err());
    }
}
