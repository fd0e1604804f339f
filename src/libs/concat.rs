use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use crate::libs::error::PipelineError;

/// One gene's trimmed alignment, keyed by sample id.
pub type AlignmentMap = BTreeMap<String, String>;

/// Which samples were absent from which gene. Diagnostics only, never
/// control flow.
pub type MissingSampleReport = BTreeMap<String, BTreeSet<String>>;

/// The joined alignment plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct ConcatResult {
    /// surviving samples in id order, sequences already separator-joined
    pub records: Vec<(String, String)>,
    /// sum of per-gene trimmed widths, separators excluded
    pub trimmed_width: usize,
    /// full row width, separators included
    pub width: usize,
    pub n_genes: usize,
    pub missing: MissingSampleReport,
}

impl ConcatResult {
    pub fn rows(&self) -> usize {
        self.records.len()
    }

    /// The run-aborting conditions: a multi-gene join no sample survived,
    /// or a single gene trimmed down to width zero. Distinguished from the
    /// per-sample drops recorded in `missing`.
    pub fn check_terminal(&self) -> Result<(), PipelineError> {
        if self.n_genes > 1 && self.records.is_empty() {
            return Err(PipelineError::FatalConcat {
                cause: "no samples shared across all genes".to_string(),
            });
        }
        if self.n_genes == 1 && self.trimmed_width == 0 {
            return Err(PipelineError::FatalConcat {
                cause: "no conserved sites found, try a more relaxed trimming mode".to_string(),
            });
        }

        Ok(())
    }
}

/// Joins trimmed per-gene alignments sample by sample.
///
/// Iterates the FIRST gene's sample ids; every later gene's record is
/// appended behind a separator. A later gene missing the sample drops the
/// sample from the output and records it once per (gene, sample); later
/// genes' copies of a dropped sample are still consumed, and whatever
/// remains unconsumed after the loop was never present in the first gene,
/// so it is attributed to the first gene's missing set.
pub fn concat_alignments(
    genes: &[String],
    mut records_by_gene: BTreeMap<String, AlignmentMap>,
    sep: &str,
) -> Result<ConcatResult, PipelineError> {
    let mut trimmed_width = 0;
    for gene in genes {
        let map = records_by_gene
            .get(gene)
            .ok_or_else(|| PipelineError::FatalConcat {
                cause: format!("no trimmed alignment for {}", gene),
            })?;
        trimmed_width += map.values().next().map_or(0, |s| s.len());
    }

    let mut missing: MissingSampleReport = genes
        .iter()
        .map(|g| (g.clone(), BTreeSet::new()))
        .collect();

    let first = &genes[0];
    let first_map = records_by_gene.remove(first).unwrap_or_default();

    let mut records = vec![];
    for (id, mut seq) in first_map {
        let mut dropped = false;
        for gene in &genes[1..] {
            // consume even when the sample is already dropped, so leftovers
            // really mean "absent from the first gene"
            match records_by_gene.get_mut(gene).and_then(|m| m.remove(&id)) {
                Some(rest) => {
                    seq.push_str(sep);
                    seq.push_str(&rest);
                }
                None => {
                    if let Some(set) = missing.get_mut(gene) {
                        set.insert(id.clone());
                    }
                    dropped = true;
                }
            }
        }
        if !dropped {
            records.push((id, seq));
        }
    }

    // remaining samples were missing from the first gene
    for gene in &genes[1..] {
        if let Some(map) = records_by_gene.get(gene) {
            if let Some(set) = missing.get_mut(first) {
                set.extend(map.keys().cloned());
            }
        }
    }

    let width = trimmed_width + genes.len().saturating_sub(1) * sep.len();

    Ok(ConcatResult {
        records,
        trimmed_width,
        width,
        n_genes: genes.len(),
        missing,
    })
}

/// Writes the concatenated FASTA through a tempfile in the target directory,
/// renamed into place only on success.
pub fn write_concat_fasta(path: &Path, records: &[(String, String)]) -> Result<(), PipelineError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix("msa_")
        .tempfile_in(dir)
        .map_err(|e| PipelineError::io(path, &e))?;

    for (id, seq) in records {
        tmp.write_all(format!(">{}\n{}\n", id, seq).as_ref())
            .map_err(|e| PipelineError::io(path, &e))?;
    }
    tmp.persist(path)
        .map_err(|e| PipelineError::io(path, &e.error))?;

    Ok(())
}

/// Formats the missing-samples report as a two-column table, `None` standing
/// in for an empty set.
pub fn format_missing_report(genes: &[String], missing: &MissingSampleReport) -> String {
    let mut out = String::from("gene\tmissing samples\n");
    for gene in genes {
        let samples = missing
            .get(gene)
            .map(|s| itertools::join(s.iter(), ", "))
            .unwrap_or_default();
        let samples = if samples.is_empty() {
            "None".to_string()
        } else {
            samples
        };
        out += &format!("{}\t{}\n", gene, samples);
    }

    out
}

pub fn write_missing_report(
    path: &Path,
    genes: &[String],
    missing: &MissingSampleReport,
) -> Result<(), PipelineError> {
    std::fs::write(path, format_missing_report(genes, missing))
        .map_err(|e| PipelineError::io(path, &e))
}
