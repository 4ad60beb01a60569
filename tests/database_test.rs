use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use quarry::{
    Compactor, Database, DocId, Document, ErrorKind, OpenMode, QuarryError, Result, TermGenerator,
    WritableDatabase,
};

fn check_values(db: &Database, expected: &BTreeMap<DocId, Vec<u8>>) -> Result<()> {
    for (&docid, value) in expected {
        assert_eq!(db.get_document(docid)?.get_value(1), value.as_slice(), "docid {docid}");
    }
    let streamed: BTreeMap<DocId, Vec<u8>> = db
        .valuestream(1)?
        .map(|item| (item.docid, item.value))
        .collect();
    let non_empty: BTreeMap<DocId, Vec<u8>> = expected
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(docid, value)| (*docid, value.clone()))
        .collect();
    assert_eq!(streamed, non_empty);
    Ok(())
}

#[test]
fn test_value_modifications() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = WritableDatabase::open(tmp.path(), OpenMode::CreateOrOverwrite)?;
    let mut rng = StdRng::seed_from_u64(42);
    let doccount: DocId = 200;
    let mut values = BTreeMap::new();

    for num in 1..doccount {
        let mut doc = Document::new();
        let value = format!("val{num}").into_bytes();
        doc.add_value(1, value.clone());
        db.add_document(doc)?;
        values.insert(num, value);
    }
    db.commit()?;
    check_values(&db, &values)?;

    for count in 1..doccount * 2 {
        let docid = rng.random_range(1..=doccount);
        let mut doc = Document::new();
        let value = if count % 5 == 0 {
            Vec::new()
        } else {
            format!("newval{count}").into_bytes()
        };
        if !value.is_empty() {
            doc.add_value(1, value.clone());
        }
        db.replace_document(docid, doc)?;
        values.insert(docid, value);
    }
    check_values(&db, &values)?;
    db.commit()?;
    check_values(&db, &values)?;

    let mut docids: Vec<DocId> = values
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(docid, _)| *docid)
        .collect();
    docids.shuffle(&mut rng);
    for docid in docids {
        db.replace_document(docid, Document::new())?;
        values.insert(docid, Vec::new());
    }
    db.commit()?;
    check_values(&db, &values)?;

    db.close()?;
    let err = db.get_document(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
    assert!(err.to_string().contains("Database has been closed"));
    Ok(())
}

#[test]
fn test_commit_persists_and_readers_pin_revisions() -> Result<()> {
    let tmp = TempDir::new()?;
    let writer = WritableDatabase::open(tmp.path(), OpenMode::Create)?;
    let mut indexer = TermGenerator::new();
    indexer.index_text("the quick brown fox", 1, "")?;
    let first = writer.add_document(indexer.get_document().clone())?;
    writer.commit()?;
    let revision = writer.get_revision()?;

    // Nothing pending: committing again changes nothing.
    writer.commit()?;
    assert_eq!(writer.get_revision()?, revision);

    let reader = Database::open(tmp.path())?;
    assert_eq!(reader.get_doccount()?, 1);
    assert_eq!(reader.get_uuid()?, writer.get_uuid()?);

    writer.delete_document(first)?;
    let second = writer.add_document(Document::new())?;
    assert!(second > first, "docids are never reused");
    writer.commit()?;

    assert_eq!(reader.get_doccount()?, 1);
    assert!(reader.reopen()?);
    assert_eq!(reader.get_doccount()?, 1);
    assert_eq!(reader.get_lastdocid()?, second);
    assert!(matches!(reader.get_document(first), Err(QuarryError::DocNotFound(d)) if d == first));
    Ok(())
}

#[test]
fn test_open_modes() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("db");
    assert_eq!(
        Database::open(&path).unwrap_err().kind(),
        ErrorKind::DatabaseOpening
    );
    WritableDatabase::open(&path, OpenMode::Create)?.close()?;
    assert_eq!(
        WritableDatabase::open(&path, OpenMode::Create).unwrap_err().kind(),
        ErrorKind::DatabaseCreate
    );
    WritableDatabase::open(&path, OpenMode::Open)?.close()?;
    Ok(())
}

#[test]
fn test_single_writer_per_directory() -> Result<()> {
    let tmp = TempDir::new()?;
    let first = WritableDatabase::open(tmp.path(), OpenMode::CreateOrOpen)?;
    first.add_document(Document::new())?;

    let err = WritableDatabase::open(tmp.path(), OpenMode::CreateOrOpen).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DatabaseLock);
    assert!(matches!(
        WritableDatabase::open(tmp.path(), OpenMode::CreateOrOverwrite),
        Err(QuarryError::DatabaseLock(_))
    ));
    first.commit()?;

    // Readers can still open it.
    assert_eq!(Database::open(tmp.path())?.get_doccount()?, 1);

    first.close()?;
    let second = WritableDatabase::open(tmp.path(), OpenMode::Open)?;
    second.add_document(Document::new())?;
    second.commit()?;
    drop(second);

    let third = WritableDatabase::open(tmp.path(), OpenMode::Open)?;
    assert_eq!(third.get_doccount()?, 2);
    Ok(())
}

#[test]
fn test_compact_then_check() -> Result<()> {
    let tmp = TempDir::new()?;
    let mut sources = Vec::new();
    for (n, text) in ["alpha beta", "gamma delta"].iter().enumerate() {
        let path = tmp.path().join(format!("src{n}"));
        let db = WritableDatabase::open(&path, OpenMode::Create)?;
        let mut indexer = TermGenerator::new();
        indexer.index_text(text, 1, "")?;
        db.add_document(indexer.get_document().clone())?;
        db.add_document(indexer.get_document().clone())?;
        db.commit()?;
        sources.push(path);
    }

    let dest = tmp.path().join("merged");
    let mut compactor = Compactor::new();
    for source in &sources {
        compactor.add_source(source);
    }
    compactor.set_destdir(&dest);
    compactor.compact()?;

    let report = Database::check(&dest)?;
    assert!(report.is_ok(), "{:?}", report.errors);
    assert_eq!(report.doccount, 4);

    let merged = Database::open(&dest)?;
    assert_eq!(merged.get_termfreq("gamma")?, 2);
    let docids: Vec<DocId> = merged.postlist("gamma")?.map(|p| p.docid()).collect();
    assert_eq!(docids, vec![3, 4]);
    Ok(())
}
