extern crate clap;
use clap::*;

mod cmd_msacat;

fn main() -> anyhow::Result<()> {
    let app = Command::new("msacat")
        .version(crate_version!())
        .author(crate_authors!())
        .about("`msacat` - per-gene MSAs, Gblocks trimming and concatenation")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .subcommand(cmd_msacat::align::make_subcommand())
        .subcommand(cmd_msacat::trim::make_subcommand())
        .subcommand(cmd_msacat::concat::make_subcommand())
        .subcommand(cmd_msacat::pl::make_subcommand())
        .after_help(
            r###"Subcommand groups:

* Stages:
    * align  - Build one MSA per gene, locally or via an EBI REST client
    * trim   - Trim an MSA to its conserved blocks with Gblocks
    * concat - Concatenate trimmed per-gene MSAs into one alignment

* Pipelines:
    * pl - align, trim and concatenate in one go

"###,
        );

    // Check which subcomamnd the user ran...
    match app.get_matches().subcommand() {
        Some(("align", sub_matches)) => cmd_msacat::align::execute(sub_matches),
        Some(("trim", sub_matches)) => cmd_msacat::trim::execute(sub_matches),
        Some(("concat", sub_matches)) => cmd_msacat::concat::execute(sub_matches),
        Some(("pl", sub_matches)) => cmd_msacat::pl::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
