use std::collections::BTreeMap;
use std::path::Path;

use clap::*;

use msacat::libs::concat::{
    concat_alignments, format_missing_report, write_concat_fasta, write_missing_report,
};
use msacat::libs::fasta;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("concat")
        .about("Concatenates trimmed per-gene MSAs into one alignment")
        .after_help(
            r###"
Joins per-gene alignments on sample id, in the given gene order, with a
separator run between genes.

* Only samples present in every gene make it into the output; every drop
  is recorded in the missing-samples report
* Samples absent from the FIRST gene are attributed to the first gene's
  report entry, whichever later gene carries them
* A multi-gene join with zero shared samples, and a single-gene run of
  width zero, abort with an error; the report is still written

Examples:
1. Concatenate two genes:
   msacat concat tests/concat/its.fasta tests/concat/lsu.fasta

2. Name the genes and keep the report:
   msacat concat a.fasta b.fasta -g gene1 -g gene2 --missing missing.tsv \
       -o msa.fasta

"###,
        )
        .arg(
            Arg::new("infiles")
                .required(true)
                .num_args(1..)
                .index(1)
                .help("Trimmed per-gene alignment FASTA file(s), in gene order"),
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
            Arg::new("sep")
                .long("sep")
                .num_args(1)
                .default_value("SSSSSSSSSS")
                .help("Separator run placed between genes"),
        )
        .arg(
            Arg::new("missing")
                .long("missing")
                .num_args(1)
                .help("Write the missing-samples report to this TSV file"),
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
    let sep = args.get_one::<String>("sep").unwrap();
    let outfile = args.get_one::<String>("outfile").unwrap();

    let pairs = super::genes_of(&infiles, &names)?;

    //----------------------------
    // Operating
    //----------------------------
    let genes: Vec<String> = pairs.iter().map(|(g, _)| g.clone()).collect();
    let mut by_gene = BTreeMap::new();
    for (gene, infile) in &pairs {
        by_gene.insert(gene.clone(), fasta::read_alignment(infile)?);
    }

    let result = concat_alignments(&genes, by_gene, sep)?;

    if let Some(missing_file) = args.get_one::<String>("missing") {
        write_missing_report(Path::new(missing_file), &genes, &result.missing)?;
    } else {
        eprint!("{}", format_missing_report(&genes, &result.missing));
    }

    result.check_terminal()?;
    eprintln!("==> MSA shape: {}x{}", result.width, result.rows());

    //----------------------------
    // Output
    //----------------------------
    if outfile == "stdout" {
        let mut writer = msacat::writer(outfile);
        fasta::write_alignment(&mut writer, &result.records)?;
    } else {
        write_concat_fasta(Path::new(outfile), &result.records)?;
    }

    Ok(())
}
