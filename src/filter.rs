//! Spectrum-list filtering.
//!
//! Filters are small predicates applied to the spectrum stream before
//! either pass sees it. Each rule is parsed from a `name args` string and
//! validated at construction time, so a bad rule fails configuration
//! loading instead of mid-run.
//!
//! Evaluation is three-valued: a rule that can be answered from the
//! header alone says accept or reject; a rule that must inspect the
//! decoded arrays answers [`FilterDecision::NeedsArrays`] until the
//! caller re-evaluates with the arrays loaded.

use std::ops::RangeInclusive;

use crate::mzml::RawSpectrum;

/// Outcome of evaluating one rule against a spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    Reject,
    /// The rule needs the binary arrays; re-evaluate with them loaded.
    NeedsArrays,
}

/// Errors from rule parsing.
#[derive(Debug, thiserror::Error)]
pub enum FilterParseError {
    #[error("empty filter rule")]
    Empty,

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("filter '{name}' has a malformed argument: {detail}")]
    BadArgument { name: String, detail: String },
}

/// One validated filter rule.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterRule {
    /// Keep spectra whose list index falls in the closed range.
    Index(RangeInclusive<i64>),

    /// Keep spectra whose MS level is one of the listed levels.
    MsLevel(Vec<u8>),

    /// Keep spectra whose scan start time (seconds) falls in `[lo, hi]`.
    ScanTime { lo: f64, hi: f64 },

    /// Keep spectra whose decoded peak count falls in the closed range.
    ///
    /// The declared header length can lie on truncated files, so this one
    /// measures the decoded intensity array.
    ArrayLength(RangeInclusive<usize>),
}

impl FilterRule {
    /// Parse a rule of the form `name arg...`.
    ///
    /// Accepted forms:
    /// - `index <lo>-<hi>`
    /// - `msLevel <n>[,<n>...]`
    /// - `scanTime [<lo>,<hi>]`
    /// - `arrayLength <lo>-<hi>`
    pub fn parse(text: &str) -> Result<Self, FilterParseError> {
        let mut parts = text.split_whitespace();
        let name = parts.next().ok_or(FilterParseError::Empty)?;
        let arg = parts.collect::<Vec<_>>().join(" ");

        match name {
            "index" => {
                let (lo, hi) = parse_dash_range(name, &arg)?;
                Ok(FilterRule::Index(lo..=hi))
            }
            "msLevel" => {
                let levels = arg
                    .split(',')
                    .map(|s| {
                        s.trim().parse::<u8>().map_err(|e| FilterParseError::BadArgument {
                            name: name.to_string(),
                            detail: e.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if levels.is_empty() {
                    return Err(FilterParseError::BadArgument {
                        name: name.to_string(),
                        detail: "expected at least one MS level".to_string(),
                    });
                }
                Ok(FilterRule::MsLevel(levels))
            }
            "scanTime" => {
                let inner = arg
                    .trim()
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .ok_or_else(|| FilterParseError::BadArgument {
                        name: name.to_string(),
                        detail: "expected [lo,hi]".to_string(),
                    })?;
                let mut bounds = inner.split(',');
                let lo = parse_f64(name, bounds.next())?;
                let hi = parse_f64(name, bounds.next())?;
                if bounds.next().is_some() || lo > hi {
                    return Err(FilterParseError::BadArgument {
                        name: name.to_string(),
                        detail: "expected [lo,hi] with lo <= hi".to_string(),
                    });
                }
                Ok(FilterRule::ScanTime { lo, hi })
            }
            "arrayLength" => {
                let (lo, hi) = parse_dash_range(name, &arg)?;
                if lo < 0 || hi < 0 {
                    return Err(FilterParseError::BadArgument {
                        name: name.to_string(),
                        detail: "lengths must be non-negative".to_string(),
                    });
                }
                Ok(FilterRule::ArrayLength(lo as usize..=hi as usize))
            }
            other => Err(FilterParseError::UnknownFilter(other.to_string())),
        }
    }

    /// Parse a whole rule list, one rule per string.
    pub fn parse_all<'a, I: IntoIterator<Item = &'a str>>(
        rules: I,
    ) -> Result<Vec<Self>, FilterParseError> {
        rules.into_iter().map(Self::parse).collect()
    }

    /// True when this rule can only be answered with arrays loaded.
    pub fn needs_arrays(&self) -> bool {
        matches!(self, FilterRule::ArrayLength(_))
    }

    /// Evaluate against a spectrum; `arrays_loaded` says whether the
    /// binary arrays were decoded for it.
    pub fn evaluate(&self, spectrum: &RawSpectrum, arrays_loaded: bool) -> FilterDecision {
        match self {
            FilterRule::Index(range) => decide(range.contains(&spectrum.index)),
            FilterRule::MsLevel(levels) => decide(levels.contains(&spectrum.ms_level)),
            FilterRule::ScanTime { lo, hi } => match spectrum.rt_seconds {
                Some(rt) => decide(rt >= *lo && rt <= *hi),
                None => FilterDecision::Reject,
            },
            FilterRule::ArrayLength(range) => {
                if !arrays_loaded {
                    return FilterDecision::NeedsArrays;
                }
                decide(range.contains(&spectrum.intensity_array.len()))
            }
        }
    }
}

/// Evaluate a rule set; any reject wins, any remaining indeterminate
/// answer surfaces as `NeedsArrays`.
pub fn evaluate_all(
    rules: &[FilterRule],
    spectrum: &RawSpectrum,
    arrays_loaded: bool,
) -> FilterDecision {
    let mut needs_arrays = false;
    for rule in rules {
        match rule.evaluate(spectrum, arrays_loaded) {
            FilterDecision::Reject => return FilterDecision::Reject,
            FilterDecision::NeedsArrays => needs_arrays = true,
            FilterDecision::Accept => {}
        }
    }
    if needs_arrays {
        FilterDecision::NeedsArrays
    } else {
        FilterDecision::Accept
    }
}

fn decide(keep: bool) -> FilterDecision {
    if keep {
        FilterDecision::Accept
    } else {
        FilterDecision::Reject
    }
}

fn parse_f64(name: &str, text: Option<&str>) -> Result<f64, FilterParseError> {
    text.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| FilterParseError::BadArgument {
            name: name.to_string(),
            detail: "expected a number".to_string(),
        })
}

fn parse_dash_range(name: &str, arg: &str) -> Result<(i64, i64), FilterParseError> {
    let bad = |detail: &str| FilterParseError::BadArgument {
        name: name.to_string(),
        detail: detail.to_string(),
    };
    let (lo, hi) = arg.trim().split_once('-').ok_or_else(|| bad("expected lo-hi"))?;
    let lo: i64 = lo.trim().parse().map_err(|_| bad("bad lower bound"))?;
    let hi: i64 = hi.trim().parse().map_err(|_| bad("bad upper bound"))?;
    if lo > hi {
        return Err(bad("lower bound exceeds upper bound"));
    }
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(index: i64, ms_level: u8, rt: f64, n_points: usize) -> RawSpectrum {
        RawSpectrum {
            index,
            ms_level,
            rt_seconds: Some(rt),
            intensity_array: vec![1.0; n_points],
            mz_array: vec![100.0; n_points],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_index() {
        let rule = FilterRule::parse("index 0-99").unwrap();
        assert_eq!(rule, FilterRule::Index(0..=99));
        assert_eq!(rule.evaluate(&spectrum(50, 1, 0.0, 0), false), FilterDecision::Accept);
        assert_eq!(rule.evaluate(&spectrum(100, 1, 0.0, 0), false), FilterDecision::Reject);
    }

    #[test]
    fn test_parse_ms_level() {
        let rule = FilterRule::parse("msLevel 1,2").unwrap();
        assert_eq!(rule.evaluate(&spectrum(0, 2, 0.0, 0), false), FilterDecision::Accept);
        assert_eq!(rule.evaluate(&spectrum(0, 3, 0.0, 0), false), FilterDecision::Reject);
    }

    #[test]
    fn test_parse_scan_time() {
        let rule = FilterRule::parse("scanTime [60,120]").unwrap();
        assert_eq!(rule.evaluate(&spectrum(0, 1, 90.0, 0), false), FilterDecision::Accept);
        assert_eq!(rule.evaluate(&spectrum(0, 1, 121.0, 0), false), FilterDecision::Reject);
    }

    #[test]
    fn test_array_length_is_three_valued() {
        let rule = FilterRule::parse("arrayLength 1-10").unwrap();
        assert!(rule.needs_arrays());
        let s = spectrum(0, 1, 0.0, 5);
        assert_eq!(rule.evaluate(&s, false), FilterDecision::NeedsArrays);
        assert_eq!(rule.evaluate(&s, true), FilterDecision::Accept);
        let empty = spectrum(0, 1, 0.0, 0);
        assert_eq!(rule.evaluate(&empty, true), FilterDecision::Reject);
    }

    #[test]
    fn test_evaluate_all_reject_wins() {
        let rules = FilterRule::parse_all(["msLevel 1", "index 0-10"]).unwrap();
        assert_eq!(
            evaluate_all(&rules, &spectrum(20, 1, 0.0, 0), false),
            FilterDecision::Reject
        );
        assert_eq!(
            evaluate_all(&rules, &spectrum(5, 1, 0.0, 0), false),
            FilterDecision::Accept
        );
    }

    #[test]
    fn test_malformed_rules() {
        assert!(FilterRule::parse("").is_err());
        assert!(FilterRule::parse("bogus 1-2").is_err());
        assert!(FilterRule::parse("index 9-1").is_err());
        assert!(FilterRule::parse("scanTime 60,120").is_err());
        assert!(FilterRule::parse("msLevel").is_err());
    }
}
