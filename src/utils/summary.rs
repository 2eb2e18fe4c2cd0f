// Parsing of tophat's align_summary.txt
use std::path::Path;

use log::warn;

use crate::config::defs::ALIGN_SUMMARY;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignmentStats {
    pub input_reads: u64,
    pub mapped_reads: u64,
    pub overall_rate: Option<f64>,
    pub concordant_rate: Option<f64>,
}

fn leading_percent(line: &str) -> Option<f64> {
    line.trim().split('%').next()?.trim().parse().ok()
}

fn count_after_colon(line: &str) -> Option<u64> {
    line.split(':').nth(1)?.split_whitespace().next()?.parse().ok()
}

/// Sums Input/Mapped over the left and right read sections and picks up the
/// overall and concordant rates.
pub fn parse_align_summary(text: &str) -> Option<AlignmentStats> {
    let mut stats = AlignmentStats::default();
    let mut seen_input = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Input") {
            stats.input_reads += count_after_colon(trimmed)?;
            seen_input = true;
        } else if trimmed.starts_with("Mapped") {
            stats.mapped_reads += count_after_colon(trimmed)?;
        } else if trimmed.ends_with("overall read mapping rate.") {
            stats.overall_rate = leading_percent(trimmed);
        } else if trimmed.ends_with("concordant pair alignment rate.") {
            stats.concordant_rate = leading_percent(trimmed);
        }
    }

    seen_input.then_some(stats)
}

pub fn read_align_summary(result_dir: &Path) -> Option<AlignmentStats> {
    let path = result_dir.join(ALIGN_SUMMARY);
    match std::fs::read_to_string(&path) {
        Ok(text) => parse_align_summary(&text),
        Err(e) => {
            warn!("no alignment summary at {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_end_summary() {
        let text = "Reads:\n          Input     :    100000\n           Mapped   :     93512 (93.5% of input)\n            of these:      2041 ( 2.2%) have multiple alignments (0 have >20)\n93.5% overall read mapping rate.\n";
        let stats = parse_align_summary(text).unwrap();
        assert_eq!(stats.input_reads, 100000);
        assert_eq!(stats.mapped_reads, 93512);
        assert_eq!(stats.overall_rate, Some(93.5));
        assert_eq!(stats.concordant_rate, None);
    }

    #[test]
    fn test_paired_end_summary() {
        let text = "Left reads:\n          Input     :     50000\n           Mapped   :     45000 (90.0% of input)\nRight reads:\n          Input     :     50000\n           Mapped   :     44000 (88.0% of input)\n89.0% overall read mapping rate.\n\nAligned pairs:     42000\n     of these:       100 ( 0.2%) have multiple alignments\n                     500 ( 1.2%) are discordant alignments\n83.0% concordant pair alignment rate.\n";
        let stats = parse_align_summary(text).unwrap();
        assert_eq!(stats.input_reads, 100000);
        assert_eq!(stats.mapped_reads, 89000);
        assert_eq!(stats.overall_rate, Some(89.0));
        assert_eq!(stats.concordant_rate, Some(83.0));
    }

    #[test]
    fn test_garbage_summary() {
        assert!(parse_align_summary("nothing to see").is_none());
    }
}
