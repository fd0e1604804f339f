use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::libs::error::PipelineError;

/// The supported multiple-alignment algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsaAlgo {
    Mafft,
    Clustalo,
    Muscle,
    TCoffee,
}

impl MsaAlgo {
    /// The binary name looked up on $PATH.
    pub fn token(&self) -> &'static str {
        match self {
            MsaAlgo::Mafft => "mafft",
            MsaAlgo::Clustalo => "clustalo",
            MsaAlgo::Muscle => "muscle",
            MsaAlgo::TCoffee => "t_coffee",
        }
    }

    /// Extra arguments for the EBI REST client of this algorithm.
    fn remote_args(&self) -> &'static [&'static str] {
        match self {
            MsaAlgo::Mafft => &["--stype", "dna"],
            MsaAlgo::Clustalo => &["--stype", "dna", "--outfmt", "fa"],
            MsaAlgo::Muscle => &["--format", "fasta"],
            MsaAlgo::TCoffee => &["--stype", "dna", "--format", "fasta_aln"],
        }
    }
}

impl std::str::FromStr for MsaAlgo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mafft" => Ok(MsaAlgo::Mafft),
            "clustalo" => Ok(MsaAlgo::Clustalo),
            "muscle" => Ok(MsaAlgo::Muscle),
            "t_coffee" | "tcoffee" => Ok(MsaAlgo::TCoffee),
            _ => Err(anyhow::anyhow!("unknown MSA algorithm `{}`", s)),
        }
    }
}

/// An alignment backend: anything that turns a gene's FASTA into a raw MSA
/// file at the canonical path, or fails.
pub trait Aligner: Sync {
    /// Backend label for error messages.
    fn backend(&self) -> String;

    fn align(
        &self,
        gene: &str,
        fasta: &Path,
        raw_msa: &Path,
        log: &Path,
    ) -> Result<(), PipelineError>;
}

fn align_err(gene: &str, backend: &str, cause: String) -> PipelineError {
    PipelineError::Alignment {
        gene: gene.to_string(),
        backend: backend.to_string(),
        cause,
    }
}

fn run_backend(mut cmd: Command, gene: &str, backend: &str, out: &Path) -> Result<(), PipelineError> {
    let status = cmd
        .status()
        .map_err(|e| align_err(gene, backend, e.to_string()))?;
    if !status.success() {
        return Err(align_err(gene, backend, status.to_string()));
    }
    if !out.exists() {
        return Err(align_err(gene, backend, "produced no output file".to_string()));
    }

    Ok(())
}

/// A pre-installed alignment binary.
pub struct LocalAligner {
    algo: MsaAlgo,
    binary: PathBuf,
    threads: usize,
}

impl LocalAligner {
    /// Looks the algorithm up on $PATH.
    pub fn discover(algo: MsaAlgo) -> Option<Self> {
        which::which(algo.token())
            .ok()
            .map(|binary| Self::with_binary(algo, binary))
    }

    pub fn with_binary<P: AsRef<Path>>(algo: MsaAlgo, binary: P) -> Self {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            algo,
            binary: binary.as_ref().to_path_buf(),
            threads,
        }
    }
}

impl Aligner for LocalAligner {
    fn backend(&self) -> String {
        format!("pre-installed {}", self.algo.token())
    }

    fn align(
        &self,
        gene: &str,
        fasta: &Path,
        raw_msa: &Path,
        log: &Path,
    ) -> Result<(), PipelineError> {
        let backend = self.backend();
        let log_out = std::fs::File::create(log).map_err(|e| PipelineError::io(log, &e))?;
        let log_err = log_out
            .try_clone()
            .map_err(|e| PipelineError::io(log, &e))?;

        let mut cmd = Command::new(&self.binary);
        match self.algo {
            MsaAlgo::Mafft => {
                // mafft writes the alignment to stdout
                let raw_out = std::fs::File::create(raw_msa)
                    .map_err(|e| PipelineError::io(raw_msa, &e))?;
                cmd.arg("--thread")
                    .arg(self.threads.to_string())
                    .arg("--auto")
                    .arg(fasta)
                    .stdout(raw_out)
                    .stderr(log_err);
            }
            MsaAlgo::Clustalo => {
                cmd.arg("--in")
                    .arg(fasta)
                    .arg("--out")
                    .arg(raw_msa)
                    .args(["--outfmt", "fasta"])
                    .arg("--threads")
                    .arg(self.threads.to_string())
                    .args(["--force", "--auto"])
                    .stdout(log_out)
                    .stderr(log_err);
            }
            MsaAlgo::Muscle => {
                cmd.arg("-in")
                    .arg(fasta)
                    .arg("-out")
                    .arg(raw_msa)
                    .stdout(log_out)
                    .stderr(log_err);
            }
            MsaAlgo::TCoffee => {
                cmd.arg("-in")
                    .arg(fasta)
                    .arg("-out")
                    .arg(raw_msa)
                    .args(["-output", "fasta_aln", "-type", "dna"])
                    .stdout(log_out)
                    .stderr(log_err);
            }
        }

        run_backend(cmd, gene, &backend, raw_msa)
    }
}

/// An EBI REST client command.
///
/// The client is treated as a black box: it is handed an output stem and
/// leaves the retrieved alignment at `<stem>.aln-fasta.fasta`, which is then
/// moved onto the canonical raw path. A courtesy pause follows each
/// submission so multi-gene runs do not hammer the public API.
pub struct RemoteAligner {
    algo: MsaAlgo,
    client: PathBuf,
    email: String,
    pause: Duration,
}

impl RemoteAligner {
    pub fn new<P: AsRef<Path>>(algo: MsaAlgo, client: P, email: &str) -> Self {
        Self {
            algo,
            client: client.as_ref().to_path_buf(),
            email: email.to_string(),
            pause: Duration::from_secs(5),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

impl Aligner for RemoteAligner {
    fn backend(&self) -> String {
        format!("online {}", self.algo.token())
    }

    fn align(
        &self,
        gene: &str,
        fasta: &Path,
        raw_msa: &Path,
        log: &Path,
    ) -> Result<(), PipelineError> {
        let backend = self.backend();
        let log_out = std::fs::File::create(log).map_err(|e| PipelineError::io(log, &e))?;
        let log_err = log_out
            .try_clone()
            .map_err(|e| PipelineError::io(log, &e))?;

        let gene_dir = raw_msa.parent().unwrap_or_else(|| Path::new("."));
        let out_stem = gene_dir.join("msa");

        let mut cmd = Command::new(&self.client);
        cmd.arg("--email")
            .arg(&self.email)
            .arg("--outfile")
            .arg(&out_stem)
            .arg("--sequence")
            .arg(fasta)
            .args(self.algo.remote_args())
            .stdout(log_out)
            .stderr(log_err);

        run_backend(cmd, gene, &backend, &retrieved_path(&out_stem))?;

        std::fs::rename(retrieved_path(&out_stem), raw_msa)
            .map_err(|e| PipelineError::io(raw_msa, &e))?;

        std::thread::sleep(self.pause);

        Ok(())
    }
}

fn retrieved_path(out_stem: &Path) -> PathBuf {
    let mut os = out_stem.as_os_str().to_owned();
    os.push(".aln-fasta.fasta");

    PathBuf::from(os)
}

/// Prefers a local binary, falls back to the remote client when one was
/// configured.
pub fn choose_backend(
    algo: MsaAlgo,
    client: Option<&Path>,
    email: Option<&str>,
) -> anyhow::Result<Box<dyn Aligner>> {
    if let Some(local) = LocalAligner::discover(algo) {
        return Ok(Box::new(local));
    }
    match (client, email) {
        (Some(client), Some(email)) => Ok(Box::new(RemoteAligner::new(algo, client, email))),
        _ => Err(anyhow::anyhow!(
            "{} was not found on $PATH and no remote client was configured",
            algo.token()
        )),
    }
}
