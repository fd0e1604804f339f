use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;
use rayon::prelude::*;

use crate::libs::align::Aligner;
use crate::libs::concat;
use crate::libs::coord::{self, RetainedRange};
use crate::libs::error::PipelineError;
use crate::libs::fasta;
use crate::libs::seqset::SequenceSet;
use crate::libs::trim::{self, Preset, TrimOverrides, Trimmer};

/// The per-run working directory.
///
/// Every gene owns `<dir>/<gene>/`; no two stages ever write the same path,
/// so per-gene work may run in parallel. The concatenated outputs at the
/// top level are written only after every gene reached a terminal state.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn gene_dir(&self, gene: &str) -> PathBuf {
        self.dir.join(gene)
    }

    pub fn gene_fasta(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join(format!("{}.fasta", gene))
    }

    pub fn raw_msa(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join(format!("{}_raw_msa.fasta", gene))
    }

    pub fn trimmed_msa(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join(format!("{}_msa.fasta", gene))
    }

    pub fn align_log(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join("align.log")
    }

    pub fn gblocks_log(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join("gblocks.log")
    }

    pub fn msa(&self) -> PathBuf {
        self.dir.join("msa.fasta")
    }

    pub fn missing(&self) -> PathBuf {
        self.dir.join("missing_samples.tsv")
    }

    pub fn blocks(&self) -> PathBuf {
        self.dir.join("retained_blocks.tsv")
    }

    pub fn init_gene(&self, gene: &str) -> Result<(), PipelineError> {
        let dir = self.gene_dir(gene);
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, &e))
    }
}

/// Advisory progress against a precomputed step count, for percent displays.
#[derive(Debug, Clone)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Succeeded,
    PartiallyFailed,
    Aborted,
}

/// What a finished (or aborted) run reports back to the caller.
#[derive(Debug)]
pub struct Outcome {
    pub state: RunState,
    pub errors: Vec<PipelineError>,
    pub cancelled: bool,
    /// rows x columns of the written MSA, when one was written
    pub shape: Option<(usize, usize)>,
    /// column mask over the concatenated raw matrix, true = retained
    pub mask: Vec<bool>,
    /// retained blocks in global coordinates, gene order
    pub blocks: Vec<(String, RetainedRange)>,
}

impl Outcome {
    /// The ordered (gene, message) error list surfaced at end of run.
    pub fn report(&self) -> Vec<(Option<String>, String)> {
        let mut list: Vec<(Option<String>, String)> = self
            .errors
            .iter()
            .map(|e| (e.gene().map(|g| g.to_string()), e.to_string()))
            .collect();
        if self.cancelled {
            list.push((None, "run cancelled".to_string()));
        }

        list
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOpts {
    /// gene processing order; the first gene seeds the sample-key iteration
    pub genes: Vec<String>,
    pub preset: Preset,
    pub overrides: TrimOverrides,
    /// filler between genes in the concatenated MSA
    pub sep: String,
    /// worker count for the per-gene stage; 1 = sequential
    pub parallel: usize,
}

struct GeneStage {
    gene: String,
    raw_width: usize,
    ranges: Vec<RetainedRange>,
}

/// Drives align -> trim per gene, then mask and concatenation.
pub struct Pipeline<'a> {
    ws: Workspace,
    opts: PipelineOpts,
    aligner: &'a dyn Aligner,
    trimmer: Option<&'a dyn Trimmer>,
    cancel: Arc<AtomicBool>,
    progress: Option<Sender<Progress>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        ws: Workspace,
        opts: PipelineOpts,
        aligner: &'a dyn Aligner,
        trimmer: Option<&'a dyn Trimmer>,
    ) -> Self {
        Self {
            ws,
            opts,
            aligner,
            trimmer,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Cooperative cancellation, checked between gene iterations.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn set_progress(&mut self, tx: Sender<Progress>) {
        self.progress = Some(tx);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn tick(&self, done: usize, total: usize, text: &str) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(Progress {
                done,
                total,
                text: text.to_string(),
            });
        }
    }

    /// align -> trim for one gene, with a single reset-and-retry when the
    /// gene directory vanished mid-run.
    fn run_gene(&self, gene: &str) -> Result<GeneStage, PipelineError> {
        let fasta_path = self.ws.gene_fasta(gene);
        if !fasta_path.exists() {
            return Err(PipelineError::Io {
                path: fasta_path.display().to_string(),
                cause: "no such file".to_string(),
            });
        }
        let set = SequenceSet::from_fasta(gene, &fasta_path.to_string_lossy()).map_err(|e| {
            PipelineError::Io {
                path: fasta_path.display().to_string(),
                cause: e.to_string(),
            }
        })?;
        if set.is_empty() {
            return Err(PipelineError::EmptyInput {
                gene: gene.to_string(),
            });
        }

        let raw = self.ws.raw_msa(gene);
        let log = self.ws.align_log(gene);
        if let Err(err) = self.aligner.align(gene, &fasta_path, &raw, &log) {
            if self.ws.gene_dir(gene).exists() {
                return Err(err);
            }
            // the working directory moved under us; re-derive once and retry
            self.ws.init_gene(gene)?;
            self.aligner.align(gene, &fasta_path, &raw, &log)?;
        }

        let expected = set.ids();
        let outcome = trim::trim_gene(
            self.trimmer,
            gene,
            &raw,
            &self.ws.trimmed_msa(gene),
            &self.ws.gblocks_log(gene),
            self.opts.preset,
            &self.opts.overrides,
            Some(&expected),
        )?;

        Ok(GeneStage {
            gene: gene.to_string(),
            raw_width: outcome.raw_width,
            ranges: outcome.ranges,
        })
    }

    fn outcome(
        &self,
        state: RunState,
        errors: Vec<PipelineError>,
        cancelled: bool,
        shape: Option<(usize, usize)>,
        mask: Vec<bool>,
        blocks: Vec<(String, RetainedRange)>,
    ) -> Outcome {
        Outcome {
            state,
            errors,
            cancelled,
            shape,
            mask,
            blocks,
        }
    }

    fn write_blocks(&self, blocks: &[(String, RetainedRange)]) -> Result<(), PipelineError> {
        let mut out = String::from("gene\tstart\tend\n");
        for (gene, range) in blocks {
            out += &format!("{}\t{}\t{}\n", gene, range.start, range.end);
        }
        let path = self.ws.blocks();
        std::fs::write(&path, out).map_err(|e| PipelineError::io(&path, &e))
    }

    pub fn run(&self) -> anyhow::Result<Outcome> {
        let genes = &self.opts.genes;
        // one step per gene, plus concatenation and report steps
        let total = genes.len() + 2;

        let mut cancelled = false;
        let results: Vec<(String, Option<Result<GeneStage, PipelineError>>)> =
            if self.opts.parallel > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.opts.parallel)
                    .build()?;
                let counter = AtomicUsize::new(0);
                let collected = pool.install(|| {
                    genes
                        .par_iter()
                        .map(|gene| {
                            if self.is_cancelled() {
                                return (gene.clone(), None);
                            }
                            let res = self.run_gene(gene);
                            let done = counter.fetch_add(1, Ordering::SeqCst) + 1;
                            self.tick(done, total, &format!("{}: aligned and trimmed", gene));
                            (gene.clone(), Some(res))
                        })
                        .collect()
                });
                cancelled = self.is_cancelled();
                collected
            } else {
                let mut collected = vec![];
                for (i, gene) in genes.iter().enumerate() {
                    if self.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    self.tick(
                        i,
                        total,
                        &format!("aligning {} [{}/{}]", gene, i + 1, genes.len()),
                    );
                    let res = self.run_gene(gene);
                    let fatal = matches!(&res, Err(e) if e.is_fatal());
                    collected.push((gene.clone(), Some(res)));
                    if fatal {
                        break;
                    }
                }
                collected
            };

        let mut errors = vec![];
        let mut stages = vec![];
        for (_, res) in results {
            match res {
                None => cancelled = true,
                Some(Ok(stage)) => stages.push(stage),
                Some(Err(err)) => errors.push(err),
            }
        }

        let fatal = errors.iter().any(|e| e.is_fatal());
        if cancelled || fatal {
            return Ok(self.outcome(RunState::Aborted, errors, cancelled, None, vec![], vec![]));
        }

        if stages.is_empty() {
            errors.push(PipelineError::FatalConcat {
                cause: "no gene produced a trimmed alignment".to_string(),
            });
            return Ok(self.outcome(RunState::Aborted, errors, false, None, vec![], vec![]));
        }

        // global coordinates over the raw concatenated matrix
        let mut offset = 0;
        let mut blocks = vec![];
        let mut all_global = vec![];
        for stage in &stages {
            let (global, next) = coord::to_global(&stage.ranges, offset, stage.raw_width);
            offset = next;
            blocks.extend(global.iter().map(|r| (stage.gene.clone(), *r)));
            all_global.extend(global);
        }
        let mask = coord::column_mask(&all_global, offset);

        self.tick(genes.len(), total, "concatenating MSAs");
        let order: Vec<String> = stages.iter().map(|s| s.gene.clone()).collect();
        let mut by_gene = BTreeMap::new();
        for stage in &stages {
            let path = self.ws.trimmed_msa(&stage.gene);
            let map = match fasta::read_alignment(&path.to_string_lossy()) {
                Ok(map) => map,
                Err(e) => {
                    errors.push(PipelineError::Io {
                        path: path.display().to_string(),
                        cause: e.to_string(),
                    });
                    return Ok(self.outcome(RunState::Aborted, errors, false, None, mask, blocks));
                }
            };
            by_gene.insert(stage.gene.clone(), map);
        }

        let result = match concat::concat_alignments(&order, by_gene, &self.opts.sep) {
            Ok(result) => result,
            Err(e) => {
                errors.push(e);
                return Ok(self.outcome(RunState::Aborted, errors, false, None, mask, blocks));
            }
        };

        // diagnostics are written even when the join turns out fatal
        self.tick(genes.len() + 1, total, "writing reports");
        concat::write_missing_report(&self.ws.missing(), &order, &result.missing)?;
        self.write_blocks(&blocks)?;

        if let Err(e) = result.check_terminal() {
            errors.push(e);
            return Ok(self.outcome(RunState::Aborted, errors, false, None, mask, blocks));
        }

        concat::write_concat_fasta(&self.ws.msa(), &result.records)?;
        let shape = Some((result.rows(), result.width));
        self.tick(total, total, "idle");

        let state = if errors.is_empty() {
            RunState::Succeeded
        } else {
            RunState::PartiallyFailed
        };

        Ok(self.outcome(state, errors, false, shape, mask, blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    struct CopyAligner;

    impl Aligner for CopyAligner {
        fn backend(&self) -> String {
            "stub".to_string()
        }

        fn align(
            &self,
            _gene: &str,
            fasta: &Path,
            raw_msa: &Path,
            _log: &Path,
        ) -> Result<(), PipelineError> {
            std::fs::copy(fasta, raw_msa).map_err(|e| PipelineError::io(raw_msa, &e))?;
            Ok(())
        }
    }

    struct FailAligner;

    impl Aligner for FailAligner {
        fn backend(&self) -> String {
            "stub".to_string()
        }

        fn align(
            &self,
            gene: &str,
            _fasta: &Path,
            _raw_msa: &Path,
            _log: &Path,
        ) -> Result<(), PipelineError> {
            Err(PipelineError::Alignment {
                gene: gene.to_string(),
                backend: "stub".to_string(),
                cause: "exit status: 1".to_string(),
            })
        }
    }

    fn stage_gene(ws: &Workspace, gene: &str, fasta: &str) {
        ws.init_gene(gene).unwrap();
        let mut fh = std::fs::File::create(ws.gene_fasta(gene)).unwrap();
        write!(fh, "{}", fasta).unwrap();
    }

    fn opts(genes: &[&str], parallel: usize) -> PipelineOpts {
        PipelineOpts {
            genes: genes.iter().map(|s| s.to_string()).collect(),
            preset: Preset::Skip,
            overrides: TrimOverrides::default(),
            sep: "SS".to_string(),
            parallel,
        }
    }

    #[test]
    fn test_run_two_genes() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        stage_gene(&ws, "its", ">x\nAAAA\n>y\nCCCC\n>z\nGGGG\n");
        stage_gene(&ws, "lsu", ">y\nTT\n>z\nAA\n>w\nCC\n");

        let aligner = CopyAligner;
        let pipeline = Pipeline::new(ws.clone(), opts(&["its", "lsu"], 1), &aligner, None);
        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.state, RunState::Succeeded);
        assert!(outcome.errors.is_empty());
        // y and z shared, width 4 + 2 + sep 2
        assert_eq!(outcome.shape, Some((2, 8)));

        let msa = std::fs::read_to_string(ws.msa()).unwrap();
        assert_eq!(msa, ">y\nCCCCSSTT\n>z\nGGGGSSAA\n");

        let missing = std::fs::read_to_string(ws.missing()).unwrap();
        assert_eq!(missing, "gene\tmissing samples\nits\tw\nlsu\tx\n");

        // skip preset keeps every raw column
        assert_eq!(outcome.mask, vec![true; 6]);
        assert_eq!(
            outcome.blocks,
            vec![
                ("its".to_string(), RetainedRange::new(0, 4)),
                ("lsu".to_string(), RetainedRange::new(4, 6)),
            ]
        );

        let blocks = std::fs::read_to_string(ws.blocks()).unwrap();
        assert_eq!(blocks, "gene\tstart\tend\nits\t0\t4\nlsu\t4\t6\n");
    }

    #[test]
    fn test_run_parallel_matches_sequential() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        stage_gene(&ws, "its", ">x\nAAAA\n>y\nCCCC\n");
        stage_gene(&ws, "lsu", ">x\nTT\n>y\nAA\n");

        let aligner = CopyAligner;
        let pipeline = Pipeline::new(ws.clone(), opts(&["its", "lsu"], 2), &aligner, None);
        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.state, RunState::Succeeded);
        assert_eq!(outcome.shape, Some((2, 8)));
        assert_eq!(
            outcome.blocks.iter().map(|(g, _)| g.as_str()).collect::<Vec<_>>(),
            vec!["its", "lsu"]
        );
    }

    #[test]
    fn test_per_gene_failure_is_collected() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        stage_gene(&ws, "its", ">x\nAAAA\n>y\nCCCC\n");
        stage_gene(&ws, "lsu", ">x\nTT\n>y\nAA\n");
        // lsu alignment will fail, its must still go through
        struct HalfAligner;
        impl Aligner for HalfAligner {
            fn backend(&self) -> String {
                "stub".to_string()
            }
            fn align(
                &self,
                gene: &str,
                fasta: &Path,
                raw_msa: &Path,
                _log: &Path,
            ) -> Result<(), PipelineError> {
                if gene == "lsu" {
                    return Err(PipelineError::Alignment {
                        gene: gene.to_string(),
                        backend: "stub".to_string(),
                        cause: "exit status: 1".to_string(),
                    });
                }
                std::fs::copy(fasta, raw_msa).map_err(|e| PipelineError::io(raw_msa, &e))?;
                Ok(())
            }
        }

        let aligner = HalfAligner;
        let pipeline = Pipeline::new(ws.clone(), opts(&["its", "lsu"], 1), &aligner, None);
        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.state, RunState::PartiallyFailed);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].gene(), Some("lsu"));
        // single surviving gene, no separator
        assert_eq!(outcome.shape, Some((2, 4)));

        let report = outcome.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].0.as_deref(), Some("lsu"));
    }

    #[test]
    fn test_missing_input_aborts() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        stage_gene(&ws, "its", ">x\nAAAA\n");
        // lsu directory never staged

        let aligner = CopyAligner;
        let pipeline = Pipeline::new(ws.clone(), opts(&["lsu", "its"], 1), &aligner, None);
        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.state, RunState::Aborted);
        assert!(matches!(outcome.errors[0], PipelineError::Io { .. }));
        // the run stopped before its was processed
        assert!(!ws.msa().exists());
    }

    #[test]
    fn test_cancellation() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        stage_gene(&ws, "its", ">x\nAAAA\n");

        let aligner = CopyAligner;
        let pipeline = Pipeline::new(ws.clone(), opts(&["its"], 1), &aligner, None);
        pipeline.cancel_flag().store(true, Ordering::SeqCst);
        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.state, RunState::Aborted);
        assert!(outcome.cancelled);
        assert!(outcome
            .report()
            .iter()
            .any(|(_, msg)| msg == "run cancelled"));
    }

    #[test]
    fn test_all_genes_failed() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        stage_gene(&ws, "its", ">x\nAAAA\n");

        let aligner = FailAligner;
        let pipeline = Pipeline::new(ws.clone(), opts(&["its"], 1), &aligner, None);
        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.state, RunState::Aborted);
        assert!(outcome
            .errors
            .iter()
            .any(|e| matches!(e, PipelineError::FatalConcat { .. })));
    }

    #[test]
    fn test_progress_counts() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        stage_gene(&ws, "its", ">x\nAAAA\n>y\nCCCC\n");

        let aligner = CopyAligner;
        let mut pipeline = Pipeline::new(ws.clone(), opts(&["its"], 1), &aligner, None);
        let (tx, rx) = crossbeam::channel::unbounded();
        pipeline.set_progress(tx);
        let outcome = pipeline.run().unwrap();
        assert_eq!(outcome.state, RunState::Succeeded);
        drop(pipeline);

        let ticks: Vec<Progress> = rx.iter().collect();
        assert!(!ticks.is_empty());
        // monotonically increasing against a fixed total
        let total = ticks[0].total;
        assert_eq!(total, 1 + 2);
        let mut last = 0;
        for tick in &ticks {
            assert_eq!(tick.total, total);
            assert!(tick.done >= last);
            last = tick.done;
        }
        assert_eq!(last, total);
    }
}
