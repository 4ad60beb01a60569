//! Snapshot file codec.
//!
//! ## File format
//!
//! ```text
//! [8: "QUARRYDB"][u32: format][u32: crc32 of body][u64: body length][body]
//! body = section*, each section = [u64: length][u32: crc32][bytes]
//! ```
//!
//! Sections, in order: header, documents, postings, term dictionary,
//! metadata, synonyms, spellings. Integers inside sections are varints.
//! The term dictionary is an `fst::Map` from term to the offset of its
//! posting list inside the postings section. Value streams are not stored;
//! they are rebuilt from the documents on load.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fst::{Map, MapBuilder, Streamer};
use uuid::Uuid;

use crate::document::{DocumentContent, TermEntry};
use crate::error::{QuarryError, Result};
use crate::storage::{DocEntry, Generation, PostingEntry, PostingList};
use crate::util::pack::{Packer, Unpacker};

pub(crate) const MAGIC: &[u8; 8] = b"QUARRYDB";
pub(crate) const FORMAT_VERSION: u32 = 1;

const SECTION_COUNT: usize = 7;

/// Serialise a generation into snapshot bytes.
pub(crate) fn encode(generation: &Generation) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    write_section(&mut body, &encode_header(generation))?;
    write_section(&mut body, &encode_documents(generation))?;
    let (postings, dictionary) = encode_postings(generation)?;
    write_section(&mut body, &postings)?;
    write_section(&mut body, &dictionary)?;
    write_section(&mut body, &encode_pairs(generation.metadata.iter()))?;
    write_section(&mut body, &encode_synonyms(&generation.synonyms))?;
    write_section(&mut body, &encode_spellings(&generation.spellings))?;

    let mut out = Vec::with_capacity(body.len() + 24);
    out.write_all(MAGIC)?;
    out.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    out.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
    out.write_u64::<LittleEndian>(body.len() as u64)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse snapshot bytes back into a generation.
pub(crate) fn decode(bytes: &[u8]) -> Result<Generation> {
    let mut cursor = Cursor::new(bytes);
    let mut magic = [0u8; 8];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| QuarryError::corrupt("snapshot too short"))?;
    if &magic != MAGIC {
        return Err(QuarryError::corrupt("bad snapshot magic"));
    }
    let format = cursor.read_u32::<LittleEndian>()?;
    if format != FORMAT_VERSION {
        return Err(QuarryError::database_opening(format!(
            "unsupported snapshot format {format}"
        )));
    }
    let crc = cursor.read_u32::<LittleEndian>()?;
    let body_len = cursor.read_u64::<LittleEndian>()? as usize;
    let start = cursor.position() as usize;
    let body = bytes
        .get(start..start.saturating_add(body_len))
        .ok_or_else(|| QuarryError::corrupt("snapshot body truncated"))?;
    if crc32fast::hash(body) != crc {
        return Err(QuarryError::corrupt("snapshot checksum mismatch"));
    }

    let sections = read_sections(body)?;
    let mut generation = decode_header(sections[0])?;
    decode_documents(sections[1], &mut generation)?;
    decode_postings(sections[2], sections[3], &mut generation)?;
    generation.metadata = decode_pairs(sections[4])?;
    generation.synonyms = decode_synonyms(sections[5])?;
    generation.spellings = decode_spellings(sections[6])?;
    generation.rebuild_stats();
    Ok(generation)
}

fn write_section(body: &mut Vec<u8>, section: &[u8]) -> Result<()> {
    body.write_u64::<LittleEndian>(section.len() as u64)?;
    body.write_u32::<LittleEndian>(crc32fast::hash(section))?;
    body.extend_from_slice(section);
    Ok(())
}

fn read_sections(body: &[u8]) -> Result<Vec<&[u8]>> {
    let mut sections = Vec::with_capacity(SECTION_COUNT);
    let mut cursor = Cursor::new(body);
    while sections.len() < SECTION_COUNT {
        let len = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| QuarryError::corrupt("missing snapshot section"))? as usize;
        let crc = cursor.read_u32::<LittleEndian>()?;
        let start = cursor.position() as usize;
        let section = body
            .get(start..start.saturating_add(len))
            .ok_or_else(|| QuarryError::corrupt("snapshot section truncated"))?;
        if crc32fast::hash(section) != crc {
            return Err(QuarryError::corrupt(format!(
                "checksum mismatch in section {}",
                sections.len()
            )));
        }
        sections.push(section);
        cursor.set_position((start + len) as u64);
    }
    Ok(sections)
}

// ── Header ──────────────────────────────────────────────────────────

fn encode_header(generation: &Generation) -> Vec<u8> {
    let mut packer = Packer::new();
    packer
        .raw(generation.uuid.as_bytes())
        .uint(generation.revision)
        .uint(generation.last_docid);
    packer.into_inner()
}

fn decode_header(section: &[u8]) -> Result<Generation> {
    let mut unpacker = Unpacker::new(section);
    let uuid = Uuid::from_slice(unpacker.raw(16)?)
        .map_err(|e| QuarryError::corrupt(format!("bad uuid: {e}")))?;
    let mut generation = Generation::new(uuid);
    generation.revision = unpacker.uint()?;
    generation.last_docid = unpacker.uint()?;
    unpacker.finish()?;
    Ok(generation)
}

// ── Documents ───────────────────────────────────────────────────────

fn encode_documents(generation: &Generation) -> Vec<u8> {
    let mut packer = Packer::new();
    packer.uint(generation.docs.len() as u64);
    let mut last_docid = 0;
    for (docid, entry) in &generation.docs {
        packer.uint(docid - last_docid);
        last_docid = *docid;
        let content = &entry.content;
        packer.bytes(&content.data);
        packer.uint(content.values.len() as u64);
        for (slot, value) in &content.values {
            packer.uint(u64::from(*slot)).bytes(value);
        }
        packer.uint(content.terms.len() as u64);
        for (term, term_entry) in &content.terms {
            packer.bytes(term).uint(u64::from(term_entry.wdf));
            packer.uint(term_entry.positions.len() as u64);
            let mut last_pos = 0;
            for &pos in &term_entry.positions {
                packer.uint(u64::from(pos - last_pos));
                last_pos = pos;
            }
        }
    }
    packer.into_inner()
}

fn decode_documents(section: &[u8], generation: &mut Generation) -> Result<()> {
    let mut unpacker = Unpacker::new(section);
    let count = unpacker.uint()?;
    let mut docid = 0;
    for _ in 0..count {
        docid += unpacker.uint()?;
        let mut content = DocumentContent {
            data: unpacker.bytes()?.to_vec(),
            ..DocumentContent::default()
        };
        for _ in 0..unpacker.uint()? {
            let slot = unpacker.u32()?;
            content.values.insert(slot, unpacker.bytes()?.to_vec());
        }
        for _ in 0..unpacker.uint()? {
            let term = unpacker.bytes()?.to_vec();
            let wdf = unpacker.u32()?;
            let npos = unpacker.uint()?;
            let mut positions = Vec::with_capacity(npos.min(4096) as usize);
            let mut pos = 0u32;
            for _ in 0..npos {
                pos = pos
                    .checked_add(unpacker.u32()?)
                    .ok_or_else(|| QuarryError::corrupt("position overflow"))?;
                positions.push(pos);
            }
            content.terms.insert(term, TermEntry { wdf, positions });
        }
        for (slot, value) in &content.values {
            let stream = generation.values.entry(*slot).or_default();
            Arc::make_mut(stream).insert(docid, value.clone());
        }
        let length = content.length();
        generation.docs.insert(
            docid,
            DocEntry {
                content: Arc::new(content),
                length,
            },
        );
    }
    unpacker.finish()
}

// ── Postings and term dictionary ────────────────────────────────────

fn encode_postings(generation: &Generation) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut blob = Packer::new();
    let mut builder = MapBuilder::memory();
    for (term, list) in &generation.postings {
        builder
            .insert(term, blob.len() as u64)
            .map_err(|e| QuarryError::database(format!("term dictionary: {e}")))?;
        blob.uint(list.entries.len() as u64);
        let mut last_docid = 0;
        for posting in &list.entries {
            blob.uint(posting.docid - last_docid)
                .uint(u64::from(posting.wdf));
            last_docid = posting.docid;
        }
    }
    let dictionary = builder
        .into_inner()
        .map_err(|e| QuarryError::database(format!("term dictionary: {e}")))?;
    Ok((blob.into_inner(), dictionary))
}

fn decode_postings(blob: &[u8], dictionary: &[u8], generation: &mut Generation) -> Result<()> {
    let map = Map::new(dictionary.to_vec())
        .map_err(|e| QuarryError::corrupt(format!("term dictionary: {e}")))?;
    let mut stream = map.stream();
    while let Some((term, offset)) = stream.next() {
        let start = usize::try_from(offset)
            .ok()
            .filter(|start| *start <= blob.len())
            .ok_or_else(|| QuarryError::corrupt("posting offset out of range"))?;
        let mut unpacker = Unpacker::new(&blob[start..]);
        let count = unpacker.uint()?;
        let mut entries = Vec::with_capacity(count.min(1 << 16) as usize);
        let mut docid = 0;
        for _ in 0..count {
            docid += unpacker.uint()?;
            let wdf = unpacker.u32()?;
            entries.push(PostingEntry { docid, wdf });
        }
        generation
            .postings
            .insert(term.to_vec(), Arc::new(PostingList::from_entries(entries)));
    }
    Ok(())
}

// ── Metadata, synonyms, spellings ───────────────────────────────────

fn encode_pairs<'a>(pairs: impl ExactSizeIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>) -> Vec<u8> {
    let mut packer = Packer::new();
    packer.uint(pairs.len() as u64);
    for (key, value) in pairs {
        packer.bytes(key).bytes(value);
    }
    packer.into_inner()
}

fn decode_pairs(section: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
    let mut unpacker = Unpacker::new(section);
    let mut pairs = BTreeMap::new();
    for _ in 0..unpacker.uint()? {
        let key = unpacker.bytes()?.to_vec();
        pairs.insert(key, unpacker.bytes()?.to_vec());
    }
    unpacker.finish()?;
    Ok(pairs)
}

fn encode_synonyms(synonyms: &BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>) -> Vec<u8> {
    let mut packer = Packer::new();
    packer.uint(synonyms.len() as u64);
    for (term, set) in synonyms {
        packer.bytes(term).uint(set.len() as u64);
        for synonym in set {
            packer.bytes(synonym);
        }
    }
    packer.into_inner()
}

fn decode_synonyms(section: &[u8]) -> Result<BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>> {
    let mut unpacker = Unpacker::new(section);
    let mut synonyms = BTreeMap::new();
    for _ in 0..unpacker.uint()? {
        let term = unpacker.bytes()?.to_vec();
        let mut set = BTreeSet::new();
        for _ in 0..unpacker.uint()? {
            set.insert(unpacker.bytes()?.to_vec());
        }
        synonyms.insert(term, set);
    }
    unpacker.finish()?;
    Ok(synonyms)
}

fn encode_spellings(spellings: &BTreeMap<Vec<u8>, u32>) -> Vec<u8> {
    let mut packer = Packer::new();
    packer.uint(spellings.len() as u64);
    for (word, freq) in spellings {
        packer.bytes(word).uint(u64::from(*freq));
    }
    packer.into_inner()
}

fn decode_spellings(section: &[u8]) -> Result<BTreeMap<Vec<u8>, u32>> {
    let mut unpacker = Unpacker::new(section);
    let mut spellings = BTreeMap::new();
    for _ in 0..unpacker.uint()? {
        let word = unpacker.bytes()?.to_vec();
        spellings.insert(word, unpacker.u32()?);
    }
    unpacker.finish()?;
    Ok(spellings)
}
