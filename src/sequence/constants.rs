// Defaults for proteome preparation and filtering
//
// Length bounds (inclusive)
pub const DEFAULT_MIN_LENGTH: usize = 50;
pub const DEFAULT_MAX_LENGTH: usize = 100_000;

// Mean disorder score at or above which a protein is disordered
pub const DEFAULT_DISORDER_THRESHOLD: f64 = 0.5;

// IUPAC ambiguity codes for amino acids
pub const DEFAULT_AMBIGUOUS_RESIDUES: &str = "BJXZ";

// Output FASTA line width
pub const LINE_WIDTH: usize = 60;

// Standardized header layout: ProteinID|GenomeID|Source|AnnotationType|Name
pub const HEADER_DELIMITER: char = '|';
pub const HEADER_FIELD_COUNT: usize = 5;
pub const NAME_FIELD_INDEX: usize = 4;
pub const UNKNOWN_SOURCE: &str = "UnknownSource";

// Header keywords that mark a protein as uncharacterised
pub const DEFAULT_HYPOTHETICAL_KEYWORDS: [&str; 10] = [
    "hypothetical",
    "uncharacterized",
    "unknown function",
    "predicted protein",
    "conserved protein",
    "putative protein",
    "DUF",
    "unnamed protein product",
    "orf",
    "possible protein",
];
