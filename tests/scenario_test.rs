use quarry::{
    Database, Document, Enquire, ExpandFlags, Op, ParseFlags, Query, QueryParser, RSet, Result,
    WritableDatabase, sortable_serialise,
};

/// Five small documents: "is it cold?" and four variants of "was it warm?".
fn setup_database() -> Result<Database> {
    let db = WritableDatabase::inmemory();

    let mut doc = Document::new();
    doc.set_data("is it cold?");
    doc.add_term("is", 1)?;
    doc.add_posting("it", 1, 1)?;
    doc.add_posting("cold", 2, 1)?;
    db.add_document(doc)?;

    let mut doc = Document::new();
    doc.set_data("was it warm?");
    doc.add_posting("was", 1, 1)?;
    doc.add_posting("it", 2, 1)?;
    doc.add_posting("warm", 3, 1)?;
    db.add_document(doc.clone())?;

    doc.set_data("was it warm? two");
    doc.add_term("two", 2)?;
    doc.add_value(0, sortable_serialise(2.0));
    db.add_document(doc.clone())?;

    doc.set_data("was it warm? three");
    doc.add_term("three", 3)?;
    doc.add_value(0, sortable_serialise(1.5));
    db.add_document(doc.clone())?;

    doc.set_data("was it warm? four it");
    doc.add_term("four", 4)?;
    doc.add_term("it", 6)?;
    doc.add_posting("it", 7, 1)?;
    doc.add_value(5, "five");
    doc.add_value(9, "nine");
    doc.add_value(0, sortable_serialise(2.0));
    db.add_document(doc)?;

    db.commit()?;
    let reader = db.reader()?;
    assert_eq!(reader.get_doccount()?, 5);
    Ok(reader)
}

fn was_or_it() -> Result<Query> {
    Query::new(Op::Or, [Query::term("was"), Query::term("it")])
}

#[test]
fn test_or_query_matches_every_document() -> Result<()> {
    let db = setup_database()?;
    let mut enquire = Enquire::new(&db);
    enquire.set_query(was_or_it()?);

    let mset = enquire.get_mset(0, 10)?;
    assert_eq!(mset.size(), 5);
    assert_eq!(mset.get_matches_lower_bound(), 5);
    assert_eq!(mset.get_matches_upper_bound(), 5);

    let third = mset.get(2).expect("third hit");
    assert_eq!(third.rank(), 2);
    assert_eq!(third.collapse_key(), b"");
    assert_eq!(third.collapse_count(), 0);
    assert_eq!(mset.get_document(2)?.get_docid(), third.docid());

    // Every page agrees with the full result.
    for first in 0..6 {
        for maxitems in 0..6 {
            let page = enquire.get_mset(first, maxitems)?;
            assert_eq!(page.get_firstitem(), first);
            for (offset, item) in page.iter().enumerate() {
                let full = mset.get(first + offset).expect("hit in full mset");
                assert_eq!(item.rank(), first + offset);
                assert_eq!(item.docid(), full.docid());
                assert_eq!(item.percent(), full.percent());
            }
        }
    }
    Ok(())
}

#[test]
fn test_phrase_needs_the_exact_run() -> Result<()> {
    let db = WritableDatabase::inmemory();
    for text in ["was it warm", "it was warm", "was it really warm", "was it warm was it"] {
        let mut doc = Document::new();
        for (pos, word) in text.split(' ').enumerate() {
            doc.add_posting(word, pos as u32 + 1, 1)?;
        }
        db.add_document(doc)?;
    }
    db.commit()?;
    let db = db.reader()?;

    let mut parser = QueryParser::new();
    let query = parser.parse_query("\"was it warm\"", ParseFlags::DEFAULT)?;
    assert_eq!(query.get_type(), Op::Phrase);

    let mut enquire = Enquire::new(&db);
    enquire.set_query(query);
    let mut docids: Vec<_> = enquire.get_mset(0, 10)?.iter().map(|item| item.docid()).collect();
    docids.sort_unstable();
    assert_eq!(docids, vec![1, 4]);
    Ok(())
}

#[test]
fn test_eset_with_query_drops_query_terms() -> Result<()> {
    let db = setup_database()?;
    let rset: RSet = [3].into_iter().collect();

    let unrestricted = Enquire::new(&db).get_eset(10, &rset)?;

    let mut enquire = Enquire::new(&db);
    enquire.set_query(was_or_it()?);
    let restricted = enquire.get_eset(10, &rset)?;

    let expected: Vec<(Vec<u8>, f64)> = unrestricted
        .iter()
        .filter(|item| item.term() != b"was" && item.term() != b"it")
        .map(|item| (item.term().to_vec(), item.weight()))
        .collect();
    let actual: Vec<(Vec<u8>, f64)> = restricted
        .iter()
        .map(|item| (item.term().to_vec(), item.weight()))
        .collect();
    assert!(!actual.is_empty());
    assert_eq!(actual, expected);

    let with_query_terms = enquire.get_eset_with(10, &rset, ExpandFlags::INCLUDE_QUERY_TERMS, None, 0.0)?;
    assert_eq!(with_query_terms.size(), unrestricted.size());
    Ok(())
}

#[test]
fn test_matching_terms_follow_query_order() -> Result<()> {
    let db = setup_database()?;
    let query = Query::new(
        Op::Or,
        ["was", "it", "warm", "two"].into_iter().map(Query::term),
    )?;
    let terms: Vec<Vec<u8>> = query.terms().map(|item| item.into_term()).collect();
    assert_eq!(terms, vec![b"it".to_vec(), b"two".to_vec(), b"warm".to_vec(), b"was".to_vec()]);

    let mut enquire = Enquire::new(&db);
    enquire.set_query(query);
    let mset = enquire.get_mset(0, 10)?;
    let top = mset.get(0).expect("a hit");
    let matching: Vec<Vec<u8>> = enquire
        .get_matching_terms(top.docid())?
        .map(|item| item.into_term())
        .collect();
    assert_eq!(matching, terms);
    Ok(())
}

#[test]
fn test_sort_by_value_then_relevance() -> Result<()> {
    let db = setup_database()?;
    let mut enquire = Enquire::new(&db);
    enquire.set_query(was_or_it()?);
    enquire.set_sort_by_value_then_relevance(0, false);

    let docids: Vec<_> = enquire.get_mset(0, 10)?.iter().map(|item| item.docid()).collect();
    // Docs without a value sort first, then 1.5, then the two 2s.
    assert_eq!(&docids[2..3], &[4]);
    assert!(docids[3..].contains(&3) && docids[3..].contains(&5));
    Ok(())
}
