//! Subcommand modules for the `msacat` binary.

pub mod align;
pub mod concat;
pub mod pl;
pub mod trim;

use std::path::{Path, PathBuf};

/// Pairs input files with gene names: `--gene` entries match by order,
/// otherwise the file stem names the gene.
pub fn genes_of(infiles: &[String], names: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    if !names.is_empty() && names.len() != infiles.len() {
        return Err(anyhow::anyhow!(
            "{} input files but {} --gene names",
            infiles.len(),
            names.len()
        ));
    }

    let mut pairs = vec![];
    for (i, infile) in infiles.iter().enumerate() {
        let gene = if names.is_empty() {
            stem_of(infile)?
        } else {
            names[i].clone()
        };
        pairs.push((gene, infile.clone()));
    }

    let mut seen = std::collections::BTreeSet::new();
    for (gene, _) in &pairs {
        if !seen.insert(gene.clone()) {
            return Err(anyhow::anyhow!("duplicates in supplied genes: {}", gene));
        }
    }

    Ok(pairs)
}

fn stem_of(infile: &str) -> anyhow::Result<String> {
    Path::new(infile)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("no file stem in `{}`", infile))
}

/// Stages an input FASTA at the workspace's canonical per-gene path.
pub fn stage_input(
    ws: &msacat::libs::pipeline::Workspace,
    gene: &str,
    infile: &str,
) -> anyhow::Result<PathBuf> {
    ws.init_gene(gene)?;
    let target = ws.gene_fasta(gene);
    let source = Path::new(infile);
    if source != target.as_path() {
        std::fs::copy(source, &target)?;
    }

    Ok(target)
}
