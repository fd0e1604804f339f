use std::collections::BTreeMap;
use std::io::Write;

/// Reads an aligned FASTA into a map keyed by record id.
///
/// Sequences are uppercased and internal whitespace is stripped, as Gblocks
/// pads its FASTA output with blanks every ten columns.
pub fn read_alignment(input: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let reader = crate::reader(input);
    let mut fa_in = noodles_fasta::io::Reader::new(reader);

    let mut seq_of: BTreeMap<String, String> = BTreeMap::new();
    for result in fa_in.records() {
        let record = result?;
        let name = String::from_utf8(record.name().into())?;
        let seq: String = record
            .sequence()
            .as_ref()
            .iter()
            .filter(|b| !b.is_ascii_whitespace())
            .map(|b| b.to_ascii_uppercase() as char)
            .collect();

        if seq_of.insert(name.clone(), seq).is_some() {
            return Err(anyhow::anyhow!("duplicated record id `{}` in {}", name, input));
        }
    }

    Ok(seq_of)
}

pub fn write_alignment<W: Write>(
    writer: &mut W,
    records: &[(String, String)],
) -> anyhow::Result<()> {
    for (name, seq) in records {
        writer.write_all(format!(">{}\n{}\n", name, seq).as_ref())?;
    }

    Ok(())
}
