use clap::*;

use msacat::libs::align::{choose_backend, Aligner, MsaAlgo, RemoteAligner};
use msacat::libs::error::PipelineError;
use msacat::libs::pipeline::Workspace;
use msacat::libs::seqset::SequenceSet;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("align")
        .about("Builds one MSA per gene, locally or via an EBI REST client")
        .after_help(
            r###"
Builds a raw multiple sequence alignment for every input gene.

* <infiles> are per-gene FASTA files of unaligned sequences
    * gene names come from --gene (matched by order) or from file stems

* Backend selection
    * a pre-installed binary of the chosen algorithm is preferred
    * with --remote, or when no binary is found and --client is set, the
      EBI REST client command is used instead; expect multi-second latency
    * remote runs pause between submissions to be polite to the public API

* Results land at <outdir>/<gene>/<gene>_raw_msa.fasta, tool output at
  <outdir>/<gene>/align.log

Examples:
1. Align two genes with a local mafft:
   msacat align tests/pl/its.fasta tests/pl/lsu.fasta -o MSA-pl

2. Align via the EBI API:
   msacat align its.fasta --remote --client tools/mafft_client \
       --email user@example.com -o MSA-pl

"###,
        )
        .arg(
            Arg::new("infiles")
                .required(true)
                .num_args(1..)
                .index(1)
                .help("Per-gene FASTA file(s) of unaligned sequences"),
        )
        .arg(
            Arg::new("genes")
                .long("gene")
                .short('g')
                .num_args(1)
                .action(ArgAction::Append)
                .help("Gene names, matched to input files by order"),
        )
        .arg(
            Arg::new("algo")
                .long("algo")
                .value_parser(["mafft", "clustalo", "muscle", "t_coffee"])
                .default_value("mafft")
                .help("MSA algorithm"),
        )
        .arg(
            Arg::new("remote")
                .long("remote")
                .action(ArgAction::SetTrue)
                .help("Force the remote EBI client even when a local binary exists"),
        )
        .arg(
            Arg::new("client")
                .long("client")
                .num_args(1)
                .help("Path of the EBI REST client command"),
        )
        .arg(
            Arg::new("email")
                .long("email")
                .num_args(1)
                .help("E-mail address handed to the EBI API"),
        )
        .arg(
            Arg::new("outdir")
                .short('o')
                .long("outdir")
                .num_args(1)
                .default_value("MSA-pl")
                .help("Working directory, one subdirectory per gene"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let infiles: Vec<String> = args
        .get_many::<String>("infiles")
        .unwrap()
        .cloned()
        .collect();
    let names: Vec<String> = args
        .get_many::<String>("genes")
        .unwrap_or_default()
        .cloned()
        .collect();
    let algo: MsaAlgo = args.get_one::<String>("algo").unwrap().parse()?;
    let is_remote = args.get_flag("remote");
    let opt_client = args.get_one::<String>("client");
    let opt_email = args.get_one::<String>("email");

    let ws = Workspace::new(args.get_one::<String>("outdir").unwrap());
    let pairs = super::genes_of(&infiles, &names)?;

    //----------------------------
    // Operating
    //----------------------------
    let aligner: Box<dyn Aligner> = if is_remote {
        match (opt_client, opt_email) {
            (Some(client), Some(email)) => Box::new(RemoteAligner::new(algo, client, email)),
            _ => {
                return Err(anyhow::anyhow!(
                    "--remote needs both --client and --email"
                ))
            }
        }
    } else {
        choose_backend(
            algo,
            opt_client.map(std::path::Path::new),
            opt_email.map(|s| s.as_str()),
        )?
    };
    eprintln!("==> {}", aligner.backend());

    for (gene, infile) in &pairs {
        let fasta = super::stage_input(&ws, gene, infile)?;
        let set = SequenceSet::from_fasta(gene, &fasta.to_string_lossy())?;
        if set.is_empty() {
            return Err(PipelineError::EmptyInput { gene: gene.clone() }.into());
        }

        eprintln!("==> aligning {} ({} sequences)", gene, set.len());
        aligner.align(gene, &fasta, &ws.raw_msa(gene), &ws.align_log(gene))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_genes_of() {
        let pairs = super::super::genes_of(
            &["tests/pl/its.fasta".to_string(), "tests/pl/lsu.fasta".to_string()],
            &[],
        )
        .unwrap();
        assert_eq!(pairs[0].0, "its");
        assert_eq!(pairs[1].0, "lsu");

        assert!(super::super::genes_of(
            &["a.fasta".to_string(), "b.fasta".to_string()],
            &["one".to_string()],
        )
        .is_err());

        assert!(super::super::genes_of(
            &["a.fasta".to_string(), "b/a.fasta".to_string()],
            &[],
        )
        .is_err());
    }

    #[test]
    fn test_local_aligner_discover() {
        // discovery must not panic; presence depends on the host
        use msacat::libs::align::{LocalAligner, MsaAlgo};
        let _ = LocalAligner::discover(MsaAlgo::TCoffee);
    }
}
