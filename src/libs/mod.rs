pub mod align;
pub mod concat;
pub mod coord;
pub mod error;
pub mod fasta;
pub mod io;
pub mod pipeline;
pub mod seqset;
pub mod trim;
