use std::collections::BTreeSet;
use std::io::Write;

/// One sample's sequence for one gene.
///
/// Quality scores, when present, come from the upstream trace trimming step
/// and are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    id: String,
    seq: Vec<u8>,
    qual: Option<Vec<u8>>,
}

impl SequenceRecord {
    pub fn new(id: &str, seq: &[u8], qual: Option<Vec<u8>>) -> Self {
        Self {
            id: id.to_string(),
            seq: seq.to_vec(),
            qual,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn qual(&self) -> Option<&[u8]> {
        self.qual.as_deref()
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// A gene's unaligned sequence records, sample ids unique, insertion order kept.
#[derive(Debug, Clone, Default)]
pub struct SequenceSet {
    gene: String,
    records: Vec<SequenceRecord>,
}

impl SequenceSet {
    pub fn new(gene: &str) -> Self {
        Self {
            gene: gene.to_string(),
            records: vec![],
        }
    }

    pub fn gene(&self) -> &str {
        &self.gene
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SequenceRecord] {
        &self.records
    }

    pub fn push(&mut self, record: SequenceRecord) -> anyhow::Result<()> {
        if self.records.iter().any(|r| r.id() == record.id()) {
            return Err(anyhow::anyhow!(
                "duplicated sample id `{}` for gene {}",
                record.id(),
                self.gene
            ));
        }
        self.records.push(record);

        Ok(())
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.id().to_string()).collect()
    }

    pub fn from_fasta(gene: &str, input: &str) -> anyhow::Result<Self> {
        let reader = crate::reader(input);
        let mut fa_in = noodles_fasta::io::Reader::new(reader);

        let mut set = Self::new(gene);
        for result in fa_in.records() {
            let record = result?;
            let name = String::from_utf8(record.name().into())?;
            set.push(SequenceRecord::new(&name, record.sequence().as_ref(), None))?;
        }

        Ok(set)
    }

    pub fn write_fasta<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        for record in &self.records {
            writer.write_all(
                format!(">{}\n{}\n", record.id(), String::from_utf8_lossy(record.seq())).as_ref(),
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_push_dup() {
        let mut set = SequenceSet::new("its");
        set.push(SequenceRecord::new("s1", b"ACGT", None)).unwrap();
        assert!(set.push(SequenceRecord::new("s1", b"ACGT", None)).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_from_fasta() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("its.fasta");
        {
            let mut fh = File::create(&path).unwrap();
            writeln!(fh, ">s1\nACGTT\n>s2\nAC-TT").unwrap();
        }

        let set = SequenceSet::from_fasta("its", path.to_str().unwrap()).unwrap();
        assert_eq!(set.gene(), "its");
        assert_eq!(set.len(), 2);
        assert_eq!(set.records()[1].seq(), b"AC-TT");
        assert!(set.ids().contains("s2"));
    }

    #[test]
    fn test_roundtrip() {
        let mut set = SequenceSet::new("lsu");
        set.push(SequenceRecord::new("s1", b"ACGT", Some(vec![40; 4])))
            .unwrap();

        let mut buf = vec![];
        set.write_fasta(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), ">s1\nACGT\n");
        assert_eq!(set.records()[0].qual(), Some([40u8; 4].as_slice()));
    }
}
