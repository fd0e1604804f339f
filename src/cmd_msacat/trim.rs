use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use clap::*;

use msacat::libs::trim::{trim_gene, GapPolicy, Gblocks, Preset, TrimOverrides, Trimmer};

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("trim")
        .about("Trims an MSA to its conserved blocks with Gblocks")
        .after_help(
            r###"
Runs Gblocks on a raw alignment and reports the retained column blocks.

* The preset maps to the five Gblocks knobs given the sequence count n:

    preset    conserved      flank              gaps  good  bad
    relaxed   n/2+1          = conserved        half     5    8
    balanced  n/2+1          min(n/4*3+1, n)    half     5    8
    default   n/2+1          min(0.85n+1, n)    none    10    8
    strict    0.9n           = conserved        none    10    8

* `skip` copies the alignment through unchanged and reports one
  full-width block
* Individual knobs can be overridden; flank is clamped up to conserved
* --required checks the alignment's ids against a name list first and
  refuses to trim a stale or hand-edited file
* Retained blocks are zero-based half-open columns, written as a TSV
  with --ranges

Examples:
1. Balanced trim, trimmed alignment to stdout:
   msacat trim tests/trim/its_raw_msa.fasta

2. Keep the block table as well:
   msacat trim tests/trim/its_raw_msa.fasta -o its_msa.fasta --ranges blocks.tsv

3. No trimming at all:
   msacat trim tests/trim/its_raw_msa.fasta --preset skip

"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Raw alignment FASTA to trim"),
        )
        .arg(
            Arg::new("preset")
                .long("preset")
                .value_parser(["skip", "relaxed", "balanced", "default", "strict"])
                .default_value("balanced")
                .help("Trimming preset"),
        )
        .arg(
            Arg::new("conserved")
                .long("conserved")
                .value_parser(value_parser!(usize))
                .num_args(1)
                .help("Override: minimum sequences for a conserved position"),
        )
        .arg(
            Arg::new("flank")
                .long("flank")
                .value_parser(value_parser!(usize))
                .num_args(1)
                .help("Override: minimum sequences for a flanking position"),
        )
        .arg(
            Arg::new("good_block")
                .long("good-block")
                .value_parser(value_parser!(usize))
                .num_args(1)
                .help("Override: minimum length of a kept block"),
        )
        .arg(
            Arg::new("bad_block")
                .long("bad-block")
                .value_parser(value_parser!(usize))
                .num_args(1)
                .help("Override: maximum contiguous nonconserved positions"),
        )
        .arg(
            Arg::new("gaps")
                .long("gaps")
                .value_parser(["none", "half", "all"])
                .num_args(1)
                .help("Override: allowed gap positions"),
        )
        .arg(
            Arg::new("required")
                .long("required")
                .short('r')
                .num_args(1)
                .help("File with the expected sample ids, one per line"),
        )
        .arg(
            Arg::new("gblocks")
                .long("gblocks")
                .num_args(1)
                .help("Path of the Gblocks binary, else it is searched on $PATH"),
        )
        .arg(
            Arg::new("ranges")
                .long("ranges")
                .num_args(1)
                .help("Write retained blocks to this TSV file"),
        )
        .arg(
            Arg::new("outfile")
                .long("outfile")
                .short('o')
                .num_args(1)
                .default_value("stdout")
                .help("Output filename. [stdout] for screen"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let infile = args.get_one::<String>("infile").unwrap();
    let preset: Preset = args.get_one::<String>("preset").unwrap().parse()?;
    let outfile = args.get_one::<String>("outfile").unwrap();

    let overrides = TrimOverrides {
        conserved: args.get_one::<usize>("conserved").copied(),
        flank: args.get_one::<usize>("flank").copied(),
        good_block: args.get_one::<usize>("good_block").copied(),
        bad_block: args.get_one::<usize>("bad_block").copied(),
        gaps: match args.get_one::<String>("gaps") {
            Some(s) => Some(s.parse::<GapPolicy>()?),
            None => None,
        },
    };

    let expected: Option<BTreeSet<String>> = args
        .get_one::<String>("required")
        .map(|f| intspan::read_first_column(f).into_iter().collect());

    let gblocks = match args.get_one::<String>("gblocks") {
        Some(path) => Some(Gblocks::with_binary(path)),
        None => Gblocks::discover(),
    };

    //----------------------------
    // Operating
    //----------------------------
    let raw = Path::new(infile);
    let work_dir = raw.parent().unwrap_or_else(|| Path::new("."));
    let trimmed = work_dir.join(format!(
        "{}_trimmed.tmp",
        raw.file_stem().unwrap_or_default().to_string_lossy()
    ));
    let log = work_dir.join("gblocks.log");

    let gene = raw
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let outcome = trim_gene(
        gblocks.as_ref().map(|g| g as &dyn Trimmer),
        &gene,
        raw,
        &trimmed,
        &log,
        preset,
        &overrides,
        expected.as_ref(),
    )?;

    eprintln!(
        "==> {}: kept {} block(s) of {} raw columns",
        gene,
        outcome.ranges.len(),
        outcome.raw_width
    );

    //----------------------------
    // Output
    //----------------------------
    if let Some(ranges_file) = args.get_one::<String>("ranges") {
        let mut writer = msacat::writer(ranges_file);
        writer.write_all(b"start\tend\n")?;
        for range in &outcome.ranges {
            writer.write_all(format!("{}\t{}\n", range.start, range.end).as_ref())?;
        }
    }

    let mut writer = msacat::writer(outfile);
    let mut reader = msacat::reader(&trimmed.to_string_lossy());
    std::io::copy(&mut reader, &mut writer)?;
    std::fs::remove_file(&trimmed)?;

    Ok(())
}
