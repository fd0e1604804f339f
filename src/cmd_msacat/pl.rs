use clap::*;
use cmd_lib::*;

use msacat::libs::align::{choose_backend, Aligner, MsaAlgo, RemoteAligner};
use msacat::libs::pipeline::{Pipeline, PipelineOpts, RunState, Workspace};
use msacat::libs::trim::{GapPolicy, Gblocks, Preset, TrimOverrides, Trimmer};

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("pl")
        .about("Pipeline - align, trim and concatenate per-gene MSAs")
        .after_help(
            r###"
* <infiles> are per-gene FASTA files of unaligned sequences
    * infile can't be stdin
    * gene names come from --gene (matched by order) or from file stems
    * the first gene seeds the sample iteration of the final join

* Per gene, the pipeline builds a raw MSA, trims it with Gblocks and
  collects the retained blocks; failures of single genes are recorded
  and the remaining genes continue. A raw alignment whose ids do not
  match its input aborts the whole run.

* Results in --outdir:
    * msa.fasta            - concatenated alignment, shared samples only
    * missing_samples.tsv  - which samples were absent from which gene
    * retained_blocks.tsv  - kept blocks in global raw coordinates
    * <gene>/              - per-gene inputs, MSAs and tool logs

* This pipeline depends on an alignment binary (or an EBI REST client)
  and, for presets other than `skip`, on `Gblocks`

Examples:
1. Two genes, balanced trimming:
   msacat pl tests/pl/its.fasta tests/pl/lsu.fasta -o MSA-pl

2. Remote alignment, no trimming:
   msacat pl its.fasta --remote --client tools/mafft_client \
       --email user@example.com --preset skip

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
            Arg::new("preset")
                .long("preset")
                .value_parser(["skip", "relaxed", "balanced", "default", "strict"])
                .default_value("balanced")
                .help("Trimming preset"),
        )
        .arg(
            Arg::new("gaps")
                .long("gaps")
                .value_parser(["none", "half", "all"])
                .num_args(1)
                .help("Override the preset's gap policy"),
        )
        .arg(
            Arg::new("gblocks")
                .long("gblocks")
                .num_args(1)
                .help("Path of the Gblocks binary, else it is searched on $PATH"),
        )
        .arg(
            Arg::new("sep")
                .long("sep")
                .num_args(1)
                .default_value("SSSSSSSSSS")
                .help("Separator run placed between genes"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .short('p')
                .value_parser(value_parser!(usize))
                .num_args(1)
                .default_value("1")
                .help("Number of genes aligned and trimmed concurrently"),
        )
        .arg(
            Arg::new("outdir")
                .short('o')
                .long("outdir")
                .num_args(1)
                .default_value("MSA-pl")
                .help("Output location"),
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
    let preset: Preset = args.get_one::<String>("preset").unwrap().parse()?;
    let sep = args.get_one::<String>("sep").unwrap().clone();
    let parallel = *args.get_one::<usize>("parallel").unwrap();
    let outdir = args.get_one::<String>("outdir").unwrap();

    std::fs::create_dir_all(outdir)?;
    let ws = Workspace::new(outdir);

    let overrides = TrimOverrides {
        gaps: match args.get_one::<String>("gaps") {
            Some(s) => Some(s.parse::<GapPolicy>()?),
            None => None,
        },
        ..Default::default()
    };

    run_cmd!(echo "==> Paths")?;
    run_cmd!(echo "    \"outdir\" = ${outdir}")?;

    //----------------------------
    // Backends
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

    let gblocks = match args.get_one::<String>("gblocks") {
        Some(path) => Some(Gblocks::with_binary(path)),
        None => Gblocks::discover(),
    };
    if preset != Preset::Skip && gblocks.is_none() {
        return Err(anyhow::anyhow!("Gblocks was not found on $PATH"));
    }

    run_cmd!(echo "==> Backends")?;
    let backend = aligner.backend();
    run_cmd!(echo "    \"aligner\" = ${backend}")?;

    //----------------------------
    // Staging
    //----------------------------
    run_cmd!(echo "==> Staging inputs")?;
    let pairs = super::genes_of(&infiles, &names)?;
    for (gene, infile) in &pairs {
        super::stage_input(&ws, gene, infile)?;
    }
    let genes: Vec<String> = pairs.iter().map(|(g, _)| g.clone()).collect();

    //----------------------------
    // Operating
    //----------------------------
    let opts = PipelineOpts {
        genes,
        preset,
        overrides,
        sep,
        parallel,
    };
    let mut pipeline = Pipeline::new(
        ws,
        opts,
        aligner.as_ref(),
        gblocks.as_ref().map(|g| g as &dyn Trimmer),
    );

    let (tx, rx) = crossbeam::channel::unbounded();
    pipeline.set_progress(tx);
    let printer = std::thread::spawn(move || {
        for p in rx.iter() {
            eprintln!("[{}/{}] {}", p.done, p.total, p.text);
        }
    });

    let outcome = pipeline.run()?;
    drop(pipeline);
    printer
        .join()
        .map_err(|_| anyhow::anyhow!("progress printer panicked"))?;

    //----------------------------
    // Report
    //----------------------------
    for (gene, message) in outcome.report() {
        match gene {
            Some(gene) => eprintln!("ERROR {}: {}", gene, message),
            None => eprintln!("ERROR {}", message),
        }
    }

    match outcome.state {
        RunState::Succeeded => {
            let (rows, width) = outcome.shape.unwrap_or((0, 0));
            run_cmd!(echo "==> MSA shape: ${width}x${rows}")?;
            Ok(())
        }
        RunState::PartiallyFailed => {
            let (rows, width) = outcome.shape.unwrap_or((0, 0));
            run_cmd!(echo "==> MSA shape: ${width}x${rows}")?;
            eprintln!("some genes failed, the MSA covers the rest");
            Ok(())
        }
        RunState::Aborted => Err(anyhow::anyhow!("run aborted")),
    }
}
