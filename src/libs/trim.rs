use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::libs::coord::RetainedRange;
use crate::libs::error::PipelineError;
use crate::libs::fasta;

/// Gblocks trimming presets.
///
/// `Skip` bypasses the tool entirely, the others map to concrete parameter
/// bundles given the sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Skip,
    Relaxed,
    Balanced,
    Default,
    Strict,
}

impl std::str::FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Preset::Skip),
            "relaxed" => Ok(Preset::Relaxed),
            "balanced" => Ok(Preset::Balanced),
            "default" => Ok(Preset::Default),
            "strict" => Ok(Preset::Strict),
            _ => Err(anyhow::anyhow!("unknown trimming preset `{}`", s)),
        }
    }
}

/// How Gblocks treats gap positions, `-b5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPolicy {
    None,
    Half,
    All,
}

impl GapPolicy {
    pub fn flag(&self) -> char {
        match self {
            GapPolicy::None => 'n',
            GapPolicy::Half => 'h',
            GapPolicy::All => 'a',
        }
    }
}

impl std::str::FromStr for GapPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(GapPolicy::None),
            "half" => Ok(GapPolicy::Half),
            "all" => Ok(GapPolicy::All),
            _ => Err(anyhow::anyhow!("unknown gap policy `{}`", s)),
        }
    }
}

/// The five numeric knobs handed to Gblocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimParams {
    /// -b1, minimum sequences for a conserved position
    pub conserved: usize,
    /// -b2, minimum sequences for a conserved flanking position
    pub flank: usize,
    /// -b4, minimum length of a good block
    pub good_block: usize,
    /// -b3, maximum contiguous nonconserved positions
    pub bad_block: usize,
    /// -b5, gap treatment
    pub gaps: GapPolicy,
}

/// Per-field overrides on top of a preset; flank is re-clamped afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimOverrides {
    pub conserved: Option<usize>,
    pub flank: Option<usize>,
    pub good_block: Option<usize>,
    pub bad_block: Option<usize>,
    pub gaps: Option<GapPolicy>,
}

impl TrimParams {
    /// Derives the parameter bundle from a preset and the sample count.
    /// Returns `None` for `Preset::Skip`.
    pub fn for_preset(preset: Preset, n_seqs: usize) -> Option<Self> {
        let n = n_seqs;
        let mut params = match preset {
            Preset::Skip => return None,
            Preset::Relaxed => Self {
                conserved: n / 2 + 1,
                flank: n / 2 + 1,
                good_block: 5,
                bad_block: 8,
                gaps: GapPolicy::Half,
            },
            Preset::Balanced => Self {
                conserved: n / 2 + 1,
                flank: (n / 4 * 3 + 1).min(n),
                good_block: 5,
                bad_block: 8,
                gaps: GapPolicy::Half,
            },
            Preset::Default => Self {
                conserved: n / 2 + 1,
                flank: ((n as f64 * 0.85) as usize + 1).min(n),
                good_block: 10,
                bad_block: 8,
                gaps: GapPolicy::None,
            },
            Preset::Strict => Self {
                conserved: (n as f64 * 0.9) as usize,
                flank: (n as f64 * 0.9) as usize,
                good_block: 10,
                bad_block: 8,
                gaps: GapPolicy::None,
            },
        };
        params.clamp_flank();

        Some(params)
    }

    pub fn apply(&mut self, overrides: &TrimOverrides) {
        if let Some(v) = overrides.conserved {
            self.conserved = v;
        }
        if let Some(v) = overrides.flank {
            self.flank = v;
        }
        if let Some(v) = overrides.good_block {
            self.good_block = v;
        }
        if let Some(v) = overrides.bad_block {
            self.bad_block = v;
        }
        if let Some(v) = overrides.gaps {
            self.gaps = v;
        }
        self.clamp_flank();
    }

    /// Flank may never drop below conserved.
    pub fn clamp_flank(&mut self) {
        if self.flank < self.conserved {
            self.flank = self.conserved;
        }
    }
}

lazy_static! {
    static ref RE_PAIR: Regex = Regex::new(r"\[\s*(\d+)\s+(\d+)\s*\]").unwrap();
}

fn pairs_of(line: &str) -> Vec<RetainedRange> {
    RE_PAIR
        .captures_iter(line)
        .map(|caps| {
            RetainedRange::from_flanks(
                caps[1].parse::<usize>().unwrap(),
                caps[2].parse::<usize>().unwrap(),
            )
        })
        .collect()
}

/// Extracts the retained flank pairs from a Gblocks text report.
///
/// The pairs follow the `Flank positions of the N selected block(s)` marker,
/// either on the marker line itself or on the line below (Gblocks 0.91b
/// prints `Flanks: [1  50]  [80  120]` on its own line).
///
/// Returns `None` when the marker line is absent, `Some(vec![])` when zero
/// blocks were kept.
pub fn parse_flank_report(text: &str) -> Option<Vec<RetainedRange>> {
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        if !line.trim_start().starts_with("Flank positions of the") {
            continue;
        }
        let mut pairs = pairs_of(line);
        if pairs.is_empty() {
            if let Some(next) = lines.next() {
                pairs = pairs_of(next);
            }
        }
        return Some(pairs);
    }

    None
}

/// An external block-selection tool.
///
/// Any backend producing a trimmed alignment at `out` plus retained ranges
/// satisfies the pipeline; tests substitute stubs.
pub trait Trimmer: Sync {
    fn trim(
        &self,
        gene: &str,
        raw: &Path,
        out: &Path,
        log: &Path,
        params: &TrimParams,
    ) -> Result<Vec<RetainedRange>, PipelineError>;
}

/// The Gblocks binary.
pub struct Gblocks {
    binary: PathBuf,
}

impl Gblocks {
    pub fn discover() -> Option<Self> {
        which::which("Gblocks").ok().map(|binary| Self { binary })
    }

    pub fn with_binary<P: AsRef<Path>>(binary: P) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }
}

fn with_appended(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);

    PathBuf::from(os)
}

impl Trimmer for Gblocks {
    fn trim(
        &self,
        gene: &str,
        raw: &Path,
        out: &Path,
        log: &Path,
        params: &TrimParams,
    ) -> Result<Vec<RetainedRange>, PipelineError> {
        let log_out = std::fs::File::create(log).map_err(|e| PipelineError::io(log, &e))?;
        let log_err = log_out
            .try_clone()
            .map_err(|e| PipelineError::io(log, &e))?;

        // Gblocks exits nonzero even on success, so the status is ignored
        // and the output files decide.
        let _ = std::process::Command::new(&self.binary)
            .arg(raw)
            .arg("-t=d")
            .arg(format!("-b1={}", params.conserved))
            .arg(format!("-b2={}", params.flank))
            .arg(format!("-b3={}", params.bad_block))
            .arg(format!("-b4={}", params.good_block))
            .arg(format!("-b5={}", params.gaps.flag()))
            .arg("-e=.txt")
            .arg("-s=y")
            .arg("-p=s")
            .stdout(log_out)
            .stderr(log_err)
            .status()
            .map_err(|e| PipelineError::Trim {
                gene: gene.to_string(),
                cause: format!("could not launch {}: {}", self.binary.display(), e),
            })?;

        let trimmed = with_appended(raw, ".txt");
        let report = with_appended(raw, ".txt.txts");

        if !trimmed.exists() {
            return Err(PipelineError::Trim {
                gene: gene.to_string(),
                cause: format!("Gblocks produced no output, see {}", log.display()),
            });
        }

        let text = std::fs::read_to_string(&report).map_err(|e| PipelineError::Trim {
            gene: gene.to_string(),
            cause: format!("could not read report {}: {}", report.display(), e),
        })?;

        let ranges = match parse_flank_report(&text) {
            Some(ranges) => ranges,
            None => {
                return Err(PipelineError::Trim {
                    gene: gene.to_string(),
                    cause: "no flank positions in report".to_string(),
                })
            }
        };
        if ranges.is_empty() {
            return Err(PipelineError::NoConservedBlocks {
                gene: gene.to_string(),
            });
        }

        std::fs::rename(&trimmed, out).map_err(|e| PipelineError::io(out, &e))?;

        Ok(ranges)
    }
}

/// What a completed per-gene trim stage reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimOutcome {
    pub n_seqs: usize,
    pub raw_width: usize,
    pub ranges: Vec<RetainedRange>,
}

/// Trims one gene's raw alignment to `out`.
///
/// Checks the raw id set against `expected_ids` first; a mismatch signals a
/// stale or hand-edited alignment and aborts the run. With `Preset::Skip`
/// the raw file is copied through unchanged and the single full-width range
/// is reported.
pub fn trim_gene(
    trimmer: Option<&dyn Trimmer>,
    gene: &str,
    raw: &Path,
    out: &Path,
    log: &Path,
    preset: Preset,
    overrides: &TrimOverrides,
    expected_ids: Option<&BTreeSet<String>>,
) -> Result<TrimOutcome, PipelineError> {
    if !raw.exists() {
        return Err(PipelineError::Io {
            path: raw.display().to_string(),
            cause: "no such file".to_string(),
        });
    }
    let seq_of = fasta::read_alignment(&raw.to_string_lossy()).map_err(|e| PipelineError::Io {
        path: raw.display().to_string(),
        cause: e.to_string(),
    })?;

    let n_seqs = seq_of.len();
    if n_seqs == 0 {
        return Err(PipelineError::Trim {
            gene: gene.to_string(),
            cause: "raw alignment holds no records".to_string(),
        });
    }
    let raw_width = seq_of.values().next().map_or(0, |s| s.len());

    if let Some(expected) = expected_ids {
        let ids: BTreeSet<String> = seq_of.keys().cloned().collect();
        if &ids != expected {
            return Err(PipelineError::AlignmentMismatch {
                gene: gene.to_string(),
            });
        }
    }

    let ranges = match TrimParams::for_preset(preset, n_seqs) {
        None => {
            // skip: pass the raw alignment through
            std::fs::copy(raw, out).map_err(|e| PipelineError::io(out, &e))?;
            vec![RetainedRange::new(0, raw_width)]
        }
        Some(mut params) => {
            params.apply(overrides);
            let trimmer = trimmer.ok_or_else(|| PipelineError::Trim {
                gene: gene.to_string(),
                cause: "Gblocks not found on $PATH".to_string(),
            })?;
            trimmer.trim(gene, raw, out, log, &params)?
        }
    };

    Ok(TrimOutcome {
        n_seqs,
        raw_width,
        ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_preset_table() {
        // n = 10
        let p = TrimParams::for_preset(Preset::Relaxed, 10).unwrap();
        assert_eq!((p.conserved, p.flank, p.good_block, p.bad_block), (6, 6, 5, 8));
        assert_eq!(p.gaps, GapPolicy::Half);

        let p = TrimParams::for_preset(Preset::Balanced, 10).unwrap();
        assert_eq!((p.conserved, p.flank), (6, 7));
        assert_eq!(p.gaps, GapPolicy::Half);

        let p = TrimParams::for_preset(Preset::Default, 10).unwrap();
        assert_eq!((p.conserved, p.flank, p.good_block), (6, 9, 10));
        assert_eq!(p.gaps, GapPolicy::None);

        let p = TrimParams::for_preset(Preset::Strict, 10).unwrap();
        assert_eq!((p.conserved, p.flank, p.good_block), (9, 9, 10));
        assert_eq!(p.gaps, GapPolicy::None);

        assert!(TrimParams::for_preset(Preset::Skip, 10).is_none());
    }

    #[test]
    fn test_preset_ordering() {
        // conserved <= flank <= n for every preset and sample count
        for n in 1..=100 {
            for preset in [
                Preset::Relaxed,
                Preset::Balanced,
                Preset::Default,
                Preset::Strict,
            ] {
                let p = TrimParams::for_preset(preset, n).unwrap();
                assert!(p.conserved <= p.flank, "{:?} n={}", preset, n);
                assert!(p.flank <= n, "{:?} n={}", preset, n);
            }
        }
    }

    #[test]
    fn test_overrides_clamp() {
        let mut p = TrimParams::for_preset(Preset::Balanced, 10).unwrap();
        p.apply(&TrimOverrides {
            conserved: Some(9),
            flank: Some(4),
            ..Default::default()
        });
        assert_eq!(p.conserved, 9);
        assert_eq!(p.flank, 9);
    }

    #[test]
    fn test_parse_flank_report_one_line() {
        let text = "Flank positions of the 2 selected block(s) = [1  50]  [80  120]\n";
        let ranges = parse_flank_report(text).unwrap();
        assert_eq!(
            ranges,
            vec![RetainedRange::new(0, 50), RetainedRange::new(79, 120)]
        );
    }

    #[test]
    fn test_parse_flank_report_two_lines() {
        let text = "\
Original alignment: 150 positions
Flank positions of the 2 selected block(s)
Flanks: [1  50]  [80  120]
New number of positions: 91
";
        let ranges = parse_flank_report(text).unwrap();
        assert_eq!(
            ranges,
            vec![RetainedRange::new(0, 50), RetainedRange::new(79, 120)]
        );
    }

    #[test]
    fn test_parse_flank_report_empty() {
        let text = "Flank positions of the 0 selected block(s)\nFlanks: \n";
        assert_eq!(parse_flank_report(text), Some(vec![]));
        assert_eq!(parse_flank_report("nothing to see here\n"), None);
    }

    #[test]
    fn test_trim_gene_skip() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("its_raw_msa.fasta");
        let out = dir.path().join("its_msa.fasta");
        let log = dir.path().join("gblocks.log");
        {
            let mut fh = std::fs::File::create(&raw).unwrap();
            writeln!(fh, ">s1\nACGT-ACG\n>s2\nACGTTACG").unwrap();
        }

        let outcome = trim_gene(
            None,
            "its",
            &raw,
            &out,
            &log,
            Preset::Skip,
            &TrimOverrides::default(),
            None,
        )
        .unwrap();

        assert_eq!(outcome.n_seqs, 2);
        assert_eq!(outcome.raw_width, 8);
        assert_eq!(outcome.ranges, vec![RetainedRange::new(0, 8)]);
        // byte-identical pass-through
        assert_eq!(
            std::fs::read(&raw).unwrap(),
            std::fs::read(&out).unwrap()
        );
    }

    #[test]
    fn test_trim_gene_mismatch() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("its_raw_msa.fasta");
        {
            let mut fh = std::fs::File::create(&raw).unwrap();
            writeln!(fh, ">s1\nACGT\n>s2\nACGT").unwrap();
        }

        let expected: std::collections::BTreeSet<String> =
            ["s1".to_string(), "s3".to_string()].into_iter().collect();
        let err = trim_gene(
            None,
            "its",
            &raw,
            &dir.path().join("its_msa.fasta"),
            &dir.path().join("gblocks.log"),
            Preset::Skip,
            &TrimOverrides::default(),
            Some(&expected),
        )
        .unwrap_err();

        assert_eq!(
            err,
            PipelineError::AlignmentMismatch {
                gene: "its".to_string()
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_trim_gene_missing_raw() {
        let dir = tempdir().unwrap();
        let err = trim_gene(
            None,
            "its",
            &dir.path().join("absent.fasta"),
            &dir.path().join("out.fasta"),
            &dir.path().join("gblocks.log"),
            Preset::Skip,
            &TrimOverrides::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
