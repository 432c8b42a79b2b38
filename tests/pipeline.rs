use std::fs;
use std::path::{Path, PathBuf};

use dark_proteome::annotation::interpro::{parse_tsv, EntryList};
use dark_proteome::annotation::SourceTable;
use dark_proteome::categorize::categorizer::{collect_evidence, write_assignments, Categorizer};
use dark_proteome::categorize::rules::{KeywordMode, RuleSet};
use dark_proteome::database::assemble::{assemble, base_from_fasta};
use dark_proteome::database::version::{Manifest, VersionWriter};
use dark_proteome::sequence::disorder::DisorderScores;
use dark_proteome::sequence::fasta::read_records;
use dark_proteome::sequence::filter::{filter_directory, Bucket, FilterParams};
use dark_proteome::sequence::prepare::prepare_genomes;
use dark_proteome::util::list_fasta_files;

fn protein(length: usize) -> String {
    format!("M{}", "A".repeat(length - 1))
}

fn write_genomes(base: &Path) {
    let genome = base.join("GCA_1");
    fs::create_dir_all(&genome).unwrap();
    let faa = [
        (">WP_1 ESCRT-III protein Snf7 [Lokiarchaeota archaeon]", protein(60)),
        (">WP_2 hypothetical protein [Lokiarchaeota archaeon]", protein(80)),
        (">WP_3 actin [Lokiarchaeota archaeon]", protein(20)),
        (">WP_4 gelsolin domain protein [Lokiarchaeota archaeon]", protein(70)),
        (">WP_5 predicted kinase [Lokiarchaeota archaeon]", format!("{}X", protein(59))),
        (">WP_6 hypothetical protein [Lokiarchaeota archaeon]", protein(90)),
    ]
    .iter()
    .map(|(h, s)| format!("{}\n{}\n", h, s))
    .collect::<String>();
    fs::write(genome.join("protein.faa"), faa).unwrap();
    // no protein.faa, skipped
    fs::create_dir_all(base.join("GCA_2")).unwrap();
}

#[test]
fn test_prepare_filter_categorize_assemble() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    // prepare
    write_genomes(&root.join("genomes"));
    let prepared = root.join("prepared");
    let report = prepare_genomes(&root.join("genomes"), &prepared, "protein.faa").unwrap();
    assert_eq!(report.genomes, 1);
    assert_eq!(report.skipped, vec!["GCA_2"]);
    assert_eq!(report.proteins_written, 6);

    let ids: Vec<String> = read_records(&prepared.join("GCA_1.fasta"))
        .unwrap()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    let escrt = "WP_1|GCA_1|Lokiarchaeota_archaeon|annotated|ESCRT-III_protein_Snf7";
    let hypothetical = "WP_2|GCA_1|Lokiarchaeota_archaeon|hypothetical|";
    assert_eq!(ids[0], escrt);
    assert_eq!(ids[1], hypothetical);

    // filter
    let disorder = root.join("disorder.csv");
    fs::write(&disorder, "id,score\nWP_1,0.1\nWP_2,0.2\nWP_3,0.1\nWP_4,0.9\nWP_5,0.1\n").unwrap();
    let scores = DisorderScores::from_path(&disorder).unwrap();
    let params = FilterParams {
        min_length: 50,
        max_length: 1000,
        disorder_threshold: Some(0.5),
        ..FilterParams::default()
    };
    let filtered = root.join("filtered");
    let report = filter_directory(&prepared, &filtered, &root.join("rejected"), &params, Some(&scores)).unwrap();
    assert_eq!(report.counts.get(Bucket::Retained), 2);
    assert_eq!(report.counts.get(Bucket::LengthRejected), 1);
    assert_eq!(report.counts.get(Bucket::Skipped), 2);
    assert_eq!(report.counts.get(Bucket::DisorderRejected), 1);
    assert_eq!(report.counts.total(), 6);

    // categorize
    let interpro = root.join("GCA_1.tsv");
    fs::write(
        &interpro,
        format!(
            "{escrt}\tabc\t60\tPfam\tPF03357\tSnf7\t1\t50\t1.0E-20\tT\t01-01-2024\tIPR005024\tSnf7 family\tGO:0007034\t-\n\
             {hypothetical}\tdef\t80\tPfam\tPF99999\tMystery domain\t5\t70\t1.0E-8\tT\t01-01-2024\tIPR999999\tMystery\t-\t-\n"
        ),
    )
    .unwrap();
    let entries_path = root.join("entry.list");
    fs::write(
        &entries_path,
        "ENTRY_AC\tENTRY_TYPE\tENTRY_NAME\nIPR005024\tFamily\tSnf7 family\nIPR999999\tDomain\tMystery domain\n",
    )
    .unwrap();

    let results = parse_tsv(&interpro).unwrap();
    let entries = EntryList::from_path(&entries_path).unwrap();
    let filtered_files = list_fasta_files(&filtered).unwrap();
    let proteins: Vec<String> = filtered_files
        .iter()
        .flat_map(|f| read_records(f).unwrap())
        .map(|r| r.id().to_string())
        .collect();

    let rules_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/category_rules.csv");
    let rules = RuleSet::from_path(&rules_path, KeywordMode::Substring).unwrap();
    let assignments = Categorizer::new(rules).assign_all(&collect_evidence(&results, &entries, &proteins));
    assert_eq!(assignments.len(), 2);
    let categories = root.join("functional_categories.tsv");
    write_assignments(&categories, &assignments).unwrap();

    // assemble, twice
    let base = base_from_fasta(&filtered_files, Some((&scores, 0.5))).unwrap();
    let sources = vec![
        results.to_source_table(),
        SourceTable::from_delimited("functional_category", &categories, "ProteinID").unwrap(),
    ];
    let precedence = vec!["functional_category".to_string()];
    let db = assemble(&base, &sources, &precedence);

    assert_eq!(db.rows.len(), 2);
    assert_eq!(db.get("WP_1", "Specific_Functional_Category"), Some("Membrane_Trafficking_ESCRT"));
    assert_eq!(db.get("WP_1", "Category_Trigger"), Some("IPR005024"));
    assert_eq!(db.get("WP_1", "IPR_IDs"), Some("IPR005024"));
    assert_eq!(db.get("WP_1", "Percent_Disorder"), Some("10.00"));
    assert_eq!(db.get("WP_2", "Specific_Functional_Category"), Some("Other_Domain"));
    assert_eq!(db.get("WP_2", "AnnotationType"), Some("hypothetical"));
    assert_eq!(db.get("WP_2", "Name"), None);

    let out = root.join("database");
    let writer = VersionWriter {
        dir: &out,
        stem: "integrated_database",
        allow_dropped_columns: false,
    };
    let first = writer.write(&db, Vec::new(), &precedence).unwrap();
    let second = writer.write(&db, Vec::new(), &precedence).unwrap();
    assert_eq!((first.version, second.version), (1, 2));
    assert_eq!(fs::read_to_string(&first.table).unwrap(), fs::read_to_string(&second.table).unwrap());

    let manifest: Manifest = serde_json::from_str(&fs::read_to_string(&second.manifest).unwrap()).unwrap();
    assert_eq!(manifest.rows, 2);
    assert_eq!(manifest.previous.as_deref(), Some("integrated_database_v1.tsv"));
    assert_eq!(manifest.unmatched_source_rows["functional_category"], 0);
}
