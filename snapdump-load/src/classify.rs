//! File classification for the restore stream demultiplexer (C11): turns
//! a relative path into a [`FileKind`], the thing the scheduler (C12)
//! actually routes on.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    SchemaCreate,
    SchemaTable,
    SchemaView,
    SchemaTrigger,
    SchemaPost,
    Checksum,
    MetadataGlobal,
    MetadataTable,
    Data,
    Resume,
    Ignored,
    LoadData,
    Tablespace,
}

/// Suffixes the stream reader recognizes as belonging to a mydumper-style
/// artifact; anything else is treated as unrelated noise in the stream
/// and dropped rather than opened as a file.
const RECOGNIZED_SUFFIXES: &[&str] = &[
    ".dat", ".dat.gz", ".dat.zst", ".sql", ".sql.gz", ".sql.zst", "metadata", "-checksum", "-checksum.gz",
    "-checksum.zst",
];

pub fn has_recognized_suffix(path: &str) -> bool {
    RECOGNIZED_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Classifies a relative path such as `db.table-schema.sql` or
/// `db.table.00000.sql.gz`. The ordering here matters: more specific
/// suffixes (`-schema-view`, `-schema-triggers`) must be checked before
/// the generic `-schema` suffix.
pub fn classify(path: &str) -> FileKind {
    let stem = strip_known_compression(path);

    if stem.ends_with("-schema-create.sql") {
        return FileKind::SchemaCreate;
    }
    if stem.ends_with("-schema-view.sql") {
        return FileKind::SchemaView;
    }
    if stem.ends_with("-schema-triggers.sql") {
        return FileKind::SchemaTrigger;
    }
    if stem.ends_with("-schema-post.sql") {
        return FileKind::SchemaPost;
    }
    if stem.ends_with("-schema.sql") {
        return FileKind::SchemaTable;
    }
    if stem.ends_with("-metadata") && !stem.ends_with("-checksum") {
        if stem.split('.').count() <= 1 {
            return FileKind::MetadataGlobal;
        }
        return FileKind::MetadataTable;
    }
    if stem == "metadata" {
        return FileKind::MetadataGlobal;
    }
    if stem.ends_with("-checksum") {
        return FileKind::Checksum;
    }
    if stem.ends_with(".resume") {
        return FileKind::Resume;
    }
    if stem.ends_with("-schema-tablespace.sql") {
        return FileKind::Tablespace;
    }
    if stem.ends_with(".dat") || is_numbered_sql_chunk(stem) {
        return FileKind::Data;
    }
    if stem.ends_with("load_data.sql") {
        return FileKind::LoadData;
    }
    FileKind::Ignored
}

fn strip_known_compression(path: &str) -> &str {
    path.strip_suffix(".gz")
        .or_else(|| path.strip_suffix(".zst"))
        .unwrap_or(path)
}

/// `db.table.00000.sql` data chunks: at least three dot-separated
/// segments ending in a numeric chunk index and `.sql`/`.dat`.
fn is_numbered_sql_chunk(stem: &str) -> bool {
    if !stem.ends_with(".sql") {
        return false;
    }
    let without_ext = &stem[..stem.len() - 4];
    match without_ext.rsplit_once('.') {
        Some((_, chunk)) => !chunk.is_empty() && chunk.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_schema_create() {
        assert_eq!(classify("db-schema-create.sql"), FileKind::SchemaCreate);
    }

    #[test]
    fn classifies_table_schema_before_generic_matches() {
        assert_eq!(classify("db.t-schema.sql"), FileKind::SchemaTable);
        assert_eq!(classify("db.t-schema-view.sql"), FileKind::SchemaView);
        assert_eq!(classify("db.t-schema-triggers.sql"), FileKind::SchemaTrigger);
    }

    #[test]
    fn classifies_numbered_data_chunk() {
        assert_eq!(classify("db.t.00000.sql"), FileKind::Data);
        assert_eq!(classify("db.t.00001.sql.gz"), FileKind::Data);
    }

    #[test]
    fn classifies_metadata_and_checksum() {
        assert_eq!(classify("metadata"), FileKind::MetadataGlobal);
        assert_eq!(classify("db.t-metadata"), FileKind::MetadataTable);
        assert_eq!(classify("db.t-checksum"), FileKind::Checksum);
    }

    #[test]
    fn recognized_suffix_gate_matches_classifiable_paths() {
        assert!(has_recognized_suffix("db.t.00000.sql.zst"));
        assert!(!has_recognized_suffix("README.md"));
    }
}
