use std::io::Cursor;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use tessera::codec::header::{write_footer, write_header};
use tessera::codec::postings::docs_enum::EnumState;
use tessera::codec::for_util::ForUtil;
use tessera::codec::postings::{
    DOC_CODEC, PAY_CODEC, POS_CODEC, TERMS_CODEC, VERSION_CURRENT, VERSION_START,
};
use tessera::storage::file::FileStorageConfig;
use tessera::storage::memory::{MemoryStorage, MemoryStorageConfig};
use tessera::storage::structured::{StructReader, StructWriter};
use tessera::storage::{Storage, create_index_output};
use tessera::{
    BLOCK_SIZE, Bits, BlockTermState, DocId, DocIterator, DocsFlags, FieldInfo, FieldInfos,
    IndexOptions, LiveDocs, PositionsIterator, PostingsReader, PostingsWriter, SegmentInfo,
    StorageConfig, StorageFactory, TesseraError,
};

#[derive(Debug, Clone)]
struct Posting {
    doc: DocId,
    freq: u32,
    positions: Vec<u32>,
}

fn random_postings(rng: &mut StdRng, count: usize, max_gap: u32, max_freq: u32) -> Vec<Posting> {
    let mut postings = Vec::with_capacity(count);
    let mut doc = rng.random_range(0..max_gap);
    for i in 0..count {
        if i > 0 {
            doc += rng.random_range(1..=max_gap);
        }
        let freq = rng.random_range(1..=max_freq);
        let mut position = 0;
        let positions = (0..freq)
            .map(|_| {
                position += rng.random_range(0..20);
                position
            })
            .collect();
        postings.push(Posting {
            doc,
            freq,
            positions,
        });
    }
    postings
}

fn segment_for(name: &str, terms: &[Vec<Posting>]) -> SegmentInfo {
    let max_doc = terms
        .iter()
        .filter_map(|postings| postings.last())
        .map(|posting| posting.doc + 1)
        .max()
        .unwrap_or(1);
    SegmentInfo::new(name, max_doc)
}

fn write_postings(
    storage: &dyn Storage,
    segment: &SegmentInfo,
    field: &FieldInfo,
    terms: &[Vec<Posting>],
) -> Vec<BlockTermState> {
    let infos = FieldInfos::new(vec![field.clone()]).unwrap();
    let mut writer = PostingsWriter::open(storage, segment, "", &infos).unwrap();
    writer.set_field(field).unwrap();

    let mut states = Vec::new();
    for postings in terms {
        writer.start_term().unwrap();
        for posting in postings {
            writer.start_doc(posting.doc, posting.freq).unwrap();
            if field.has_positions() {
                for &position in &posting.positions {
                    writer.add_position(position).unwrap();
                }
            }
            writer.finish_doc().unwrap();
        }
        states.push(writer.finish_term().unwrap());
    }
    writer.close().unwrap();
    states
}

fn open_reader(storage: &dyn Storage, segment: &SegmentInfo, field: &FieldInfo) -> PostingsReader {
    let infos = FieldInfos::new(vec![field.clone()]).unwrap();
    PostingsReader::open(storage, segment, "", &infos).unwrap()
}

fn drain<I: DocIterator>(iter: &mut I) -> Vec<(DocId, u32)> {
    let mut docs = Vec::new();
    while let Some(doc) = iter.next_doc().unwrap() {
        docs.push((doc, iter.freq()));
    }
    docs
}

fn expected(postings: &[Posting]) -> Vec<(DocId, u32)> {
    postings.iter().map(|p| (p.doc, p.freq)).collect()
}

#[test]
fn test_docs_round_trip_across_block_boundaries() {
    let mut rng = StdRng::seed_from_u64(41);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let sizes = [2usize, 127, 128, 129, 256, 300, 1000];
    let terms: Vec<Vec<Posting>> = sizes
        .iter()
        .map(|&n| random_postings(&mut rng, n, 50, 12))
        .collect();

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);

    for (state, &n) in states.iter().zip(sizes.iter()) {
        assert_eq!(state.doc_freq as usize, n);
        assert_eq!(state.skip_offset.is_some(), n > BLOCK_SIZE);
        assert_eq!(state.singleton_doc_id, None);
    }

    let reader = open_reader(&storage, &segment, &field);
    reader.check_integrity().unwrap();
    for (postings, state) in terms.iter().zip(states.iter()) {
        let mut docs = reader
            .docs(&field, state, None, None, DocsFlags::FREQS)
            .unwrap();
        assert_eq!(docs.state(), EnumState::Fresh);
        assert_eq!(docs.doc_id(), None);
        assert_eq!(docs.cost(), postings.len() as u64);
        assert_eq!(drain(&mut docs), expected(postings));
        assert_eq!(docs.state(), EnumState::Exhausted);
        // Exhaustion is sticky.
        assert_eq!(docs.next_doc().unwrap(), None);
        assert_eq!(docs.doc_id(), None);

        let total: u64 = postings.iter().map(|p| u64::from(p.freq)).sum();
        assert_eq!(state.total_term_freq, total);
    }
}

#[test]
fn test_freqs_not_requested_report_one() {
    let mut rng = StdRng::seed_from_u64(7);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let terms = vec![random_postings(&mut rng, 400, 10, 9)];

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);
    let reader = open_reader(&storage, &segment, &field);

    let mut docs = reader
        .docs(&field, &states[0], None, None, DocsFlags::NONE)
        .unwrap();
    let read = drain(&mut docs);
    assert_eq!(read.len(), 400);
    assert!(read.iter().all(|&(_, freq)| freq == 1));
    let ids: Vec<DocId> = read.iter().map(|&(doc, _)| doc).collect();
    let wanted: Vec<DocId> = terms[0].iter().map(|p| p.doc).collect();
    assert_eq!(ids, wanted);
}

#[test]
fn test_docs_only_field() {
    let mut rng = StdRng::seed_from_u64(8);
    let field = FieldInfo::new("id", 0, IndexOptions::Docs);
    let terms = vec![random_postings(&mut rng, 333, 4, 5)];

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);
    assert_eq!(states[0].total_term_freq, 333);
    assert!(!storage.file_exists("_0.pos"));

    let reader = open_reader(&storage, &segment, &field);
    let mut docs = reader
        .docs(&field, &states[0], None, None, DocsFlags::FREQS)
        .unwrap();
    let read = drain(&mut docs);
    assert!(read.iter().all(|&(_, freq)| freq == 1));
    assert_eq!(read.len(), 333);

    let err = reader
        .docs_and_positions(&field, &states[0], None, None)
        .unwrap_err();
    assert!(matches!(err, TesseraError::InvalidArgument(_)));
}

#[test]
fn test_singleton_term_reads_no_doc_stream() {
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let terms = vec![vec![Posting {
        doc: 42,
        freq: 3,
        positions: vec![],
    }]];

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = SegmentInfo::new("_0", 100);
    let mut states = write_postings(&storage, &segment, &field, &terms);
    assert_eq!(states[0].singleton_doc_id, Some(42));

    // Point the term far past the end of the stream: any read would fail.
    states[0].doc_start_fp = 1 << 40;

    let reader = open_reader(&storage, &segment, &field);
    let mut docs = reader
        .docs(&field, &states[0], None, None, DocsFlags::FREQS)
        .unwrap();
    assert_eq!(docs.next_doc().unwrap(), Some(42));
    assert_eq!(docs.freq(), 3);
    assert_eq!(docs.next_doc().unwrap(), None);

    let mut docs = reader
        .docs(&field, &states[0], None, None, DocsFlags::FREQS)
        .unwrap();
    assert_eq!(docs.advance(43).unwrap(), None);
}

#[test]
fn test_live_docs_filtering() {
    let mut rng = StdRng::seed_from_u64(99);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let terms = vec![random_postings(&mut rng, 700, 6, 4)];

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);

    let mut live = LiveDocs::all_live(segment.doc_count as usize);
    for (i, posting) in terms[0].iter().enumerate() {
        if i % 3 == 0 {
            live.delete(posting.doc);
        }
    }
    let live: Arc<dyn Bits> = Arc::new(live);
    let wanted: Vec<(DocId, u32)> = terms[0]
        .iter()
        .filter(|p| live.get(p.doc as usize))
        .map(|p| (p.doc, p.freq))
        .collect();

    let reader = open_reader(&storage, &segment, &field);
    let mut docs = reader
        .docs(&field, &states[0], Some(live.clone()), None, DocsFlags::FREQS)
        .unwrap();
    assert_eq!(drain(&mut docs), wanted);

    // Advancing onto a deleted document lands on the next live one.
    let deleted = terms[0][3].doc;
    assert!(!live.get(deleted as usize));
    let mut docs = reader
        .docs(&field, &states[0], Some(live), None, DocsFlags::FREQS)
        .unwrap();
    assert_eq!(docs.advance(deleted).unwrap(), Some(terms[0][4].doc));
}

#[test]
fn test_advance_uses_skip_data() {
    let mut rng = StdRng::seed_from_u64(2024);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let terms = vec![random_postings(&mut rng, 20_000, 5, 7)];
    let doc_ids: Vec<DocId> = terms[0].iter().map(|p| p.doc).collect();

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);
    assert!(states[0].skip_offset.is_some());
    let reader = open_reader(&storage, &segment, &field);

    for _ in 0..20 {
        let mut docs = reader
            .docs(&field, &states[0], None, None, DocsFlags::FREQS)
            .unwrap();
        let mut target = 0;
        loop {
            target += rng.random_range(1..3000);
            let index = doc_ids.partition_point(|&doc| doc < target);
            let result = docs.advance(target).unwrap();
            match doc_ids.get(index) {
                Some(&doc) => {
                    assert_eq!(result, Some(doc));
                    assert_eq!(docs.freq(), terms[0][index].freq);
                    target = doc;
                }
                None => {
                    assert_eq!(result, None);
                    break;
                }
            }
            // Interleave plain iteration with skipping.
            if rng.random_bool(0.3) {
                match doc_ids.get(index + 1) {
                    Some(&next) => {
                        assert_eq!(docs.next_doc().unwrap(), Some(next));
                        target = next;
                    }
                    None => {
                        assert_eq!(docs.next_doc().unwrap(), None);
                        break;
                    }
                }
            }
        }
        assert_eq!(docs.advance(u32::MAX - 1).unwrap(), None);
    }
}

#[test]
fn test_advance_must_move_forward() {
    let mut rng = StdRng::seed_from_u64(5);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let terms = vec![random_postings(&mut rng, 50, 10, 2)];

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);
    let reader = open_reader(&storage, &segment, &field);

    let mut docs = reader
        .docs(&field, &states[0], None, None, DocsFlags::FREQS)
        .unwrap();
    let first = docs.next_doc().unwrap().unwrap();
    let err = docs.advance(first).unwrap_err();
    assert!(err.is_programming_error());
}

#[test]
fn test_positions_round_trip() {
    let mut rng = StdRng::seed_from_u64(314);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqsAndPositions);
    let mut terms = vec![
        random_postings(&mut rng, 1, 1, 5),
        random_postings(&mut rng, 90, 8, 3),
        random_postings(&mut rng, 1500, 8, 6),
    ];
    // Exactly one packed block of positions and nothing in the tail.
    terms.push(
        (0..BLOCK_SIZE as u32)
            .map(|doc| Posting {
                doc: doc * 2,
                freq: 1,
                positions: vec![doc % 7],
            })
            .collect(),
    );

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);
    assert_eq!(states[3].total_term_freq, BLOCK_SIZE as u64);
    assert_eq!(states[3].last_pos_block_offset, None);
    assert!(states[2].last_pos_block_offset.is_some());

    let reader = open_reader(&storage, &segment, &field);
    reader.check_integrity().unwrap();
    for (postings, state) in terms.iter().zip(states.iter()) {
        let mut positions = reader
            .docs_and_positions(&field, state, None, None)
            .unwrap();
        for posting in postings {
            assert_eq!(positions.next_doc().unwrap(), Some(posting.doc));
            assert_eq!(positions.freq(), posting.freq);
            for &position in &posting.positions {
                assert_eq!(positions.next_position().unwrap(), position);
            }
            assert!(positions.next_position().is_err());
        }
        assert_eq!(positions.next_doc().unwrap(), None);
    }
}

#[test]
fn test_positions_partially_read_and_skipped() {
    let mut rng = StdRng::seed_from_u64(1618);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqsAndPositions);
    let terms = vec![random_postings(&mut rng, 5000, 6, 9)];
    let doc_ids: Vec<DocId> = terms[0].iter().map(|p| p.doc).collect();

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);
    let reader = open_reader(&storage, &segment, &field);

    // Read only some positions of some documents.
    let mut positions = reader
        .docs_and_positions(&field, &states[0], None, None)
        .unwrap();
    assert!(positions.next_position().is_err());
    for posting in &terms[0] {
        assert_eq!(positions.next_doc().unwrap(), Some(posting.doc));
        let wanted = rng.random_range(0..=posting.freq) as usize;
        for &position in posting.positions.iter().take(wanted) {
            assert_eq!(positions.next_position().unwrap(), position);
        }
    }
    assert_eq!(positions.next_doc().unwrap(), None);

    // Skip through the term and read every position where we land.
    let mut positions = reader
        .docs_and_positions(&field, &states[0], None, Some(positions))
        .unwrap();
    let mut target = 0;
    loop {
        target += rng.random_range(1..2000);
        let index = doc_ids.partition_point(|&doc| doc < target);
        let Some(&doc) = doc_ids.get(index) else {
            assert_eq!(positions.advance(target).unwrap(), None);
            break;
        };
        assert_eq!(positions.advance(target).unwrap(), Some(doc));
        let posting = &terms[0][index];
        assert_eq!(positions.freq(), posting.freq);
        for &position in &posting.positions {
            assert_eq!(positions.next_position().unwrap(), position);
        }
        target = doc;
    }
}

#[test]
fn test_enum_reuse_across_terms() {
    let mut rng = StdRng::seed_from_u64(11);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let terms: Vec<Vec<Posting>> = (0..6)
        .map(|i| random_postings(&mut rng, 1 + i * 97, 9, 4))
        .collect();

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let states = write_postings(&storage, &segment, &field, &terms);
    let reader = open_reader(&storage, &segment, &field);

    let mut reuse = None;
    for (postings, state) in terms.iter().zip(states.iter()) {
        let mut docs = reader
            .docs(&field, state, None, reuse.take(), DocsFlags::FREQS)
            .unwrap();
        // Leave the previous term half consumed.
        let half = postings.len() / 2;
        assert_eq!(drain(&mut docs), expected(postings));
        let mut docs = reader
            .docs(&field, state, None, Some(docs), DocsFlags::FREQS)
            .unwrap();
        for posting in &postings[..half] {
            assert_eq!(docs.next_doc().unwrap(), Some(posting.doc));
        }
        reuse = Some(docs);
    }

    // An enumerator from another reader is not recycled but still works.
    let other = open_reader(&storage, &segment, &field);
    let mut docs = other
        .docs(&field, &states[5], None, reuse, DocsFlags::FREQS)
        .unwrap();
    assert_eq!(drain(&mut docs), expected(&terms[5]));
}

#[test]
fn test_term_metadata_round_trip() {
    let mut rng = StdRng::seed_from_u64(3);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqsAndPositions);
    let terms = vec![
        random_postings(&mut rng, 1, 3, 3),
        random_postings(&mut rng, 200, 3, 3),
        random_postings(&mut rng, 5, 3, 3),
    ];

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    let infos = FieldInfos::new(vec![field.clone()]).unwrap();
    let mut writer = PostingsWriter::open(&storage, &segment, "", &infos).unwrap();
    writer.set_field(&field).unwrap();

    let mut encoded = Vec::new();
    let mut states = Vec::new();
    for postings in &terms {
        writer.start_term().unwrap();
        for posting in postings {
            writer.start_doc(posting.doc, posting.freq).unwrap();
            for &position in &posting.positions {
                writer.add_position(position).unwrap();
            }
            writer.finish_doc().unwrap();
        }
        let state = writer.finish_term().unwrap();
        encoded.push(writer.encode_term(&state, &field, states.last()).unwrap());
        states.push(state);
    }
    writer.close().unwrap();

    let reader = PostingsReader::open(&storage, &segment, "", &infos).unwrap();
    let mut previous: Option<BlockTermState> = None;
    for (bytes, state) in encoded.iter().zip(states.iter()) {
        let decoded = reader
            .decode_term(bytes, &field, previous.as_ref())
            .unwrap();
        assert_eq!(&decoded, state);
        previous = Some(decoded);
    }
}

#[test]
fn test_terms_header_block_size_mismatch() {
    let mut out = StructWriter::new(Vec::new());
    PostingsWriter::init(&mut out).unwrap();
    let mut input = StructReader::new(Cursor::new(out.into_inner()));
    assert_eq!(
        PostingsReader::init(&mut input, "_0.tim").unwrap(),
        VERSION_CURRENT
    );

    let mut out = StructWriter::new(Vec::new());
    write_header(&mut out, TERMS_CODEC, VERSION_CURRENT).unwrap();
    out.write_vint(64).unwrap();
    let mut input = StructReader::new(Cursor::new(out.into_inner()));
    let err = PostingsReader::init(&mut input, "_0.tim").unwrap_err();
    assert!(matches!(
        err,
        TesseraError::BlockSizeMismatch {
            index_time: 64,
            read_time: 128
        }
    ));
}

#[test]
fn test_doc_stream_header_mismatches() {
    let field = FieldInfo::new("id", 0, IndexOptions::Docs);
    let infos = FieldInfos::new(vec![field]).unwrap();
    let segment = SegmentInfo::new("_0", 10);

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let mut out = create_index_output(&storage, "_0.doc").unwrap();
    write_header(&mut out, DOC_CODEC, VERSION_CURRENT + 1).unwrap();
    write_footer(&mut out).unwrap();
    out.close().unwrap();
    let err = PostingsReader::open(&storage, &segment, "", &infos).unwrap_err();
    assert!(matches!(
        err,
        TesseraError::VersionMismatch { actual: 3, .. }
    ));

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let mut out = create_index_output(&storage, "_0.doc").unwrap();
    write_header(&mut out, "SomethingElse", VERSION_CURRENT).unwrap();
    write_footer(&mut out).unwrap();
    out.close().unwrap();
    let err = PostingsReader::open(&storage, &segment, "", &infos).unwrap_err();
    assert!(matches!(err, TesseraError::FormatMismatch { .. }));

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let err = PostingsReader::open(&storage, &segment, "", &infos).unwrap_err();
    assert!(matches!(err, TesseraError::Io(_)));
}

fn write_stream(storage: &dyn Storage, name: &str, codec: &str, version: i32) {
    let mut out = create_index_output(storage, name).unwrap();
    write_header(&mut out, codec, version).unwrap();
    if codec == DOC_CODEC {
        ForUtil::new().write_setup(&mut out).unwrap();
    }
    write_footer(&mut out).unwrap();
    out.close().unwrap();
}

#[test]
fn test_streams_must_share_doc_version() {
    let segment = SegmentInfo::new("_0", 10);

    let positions = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqsAndPositions);
    let infos = FieldInfos::new(vec![positions]).unwrap();
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    write_stream(&storage, "_0.doc", DOC_CODEC, VERSION_CURRENT);
    write_stream(&storage, "_0.pos", POS_CODEC, VERSION_START);
    match PostingsReader::open(&storage, &segment, "", &infos).unwrap_err() {
        TesseraError::VersionMismatch {
            resource,
            actual,
            min,
            max,
        } => {
            assert_eq!(resource, "_0.pos");
            assert_eq!(actual, VERSION_START);
            assert_eq!((min, max), (VERSION_CURRENT, VERSION_CURRENT));
        }
        other => panic!("unexpected error: {other}"),
    }

    let offsets = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqsAndPositionsAndOffsets);
    let infos = FieldInfos::new(vec![offsets]).unwrap();
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    write_stream(&storage, "_0.doc", DOC_CODEC, VERSION_CURRENT);
    write_stream(&storage, "_0.pos", POS_CODEC, VERSION_CURRENT);
    write_stream(&storage, "_0.pay", PAY_CODEC, VERSION_START);
    let err = PostingsReader::open(&storage, &segment, "", &infos).unwrap_err();
    assert!(matches!(
        err,
        TesseraError::VersionMismatch { ref resource, actual: 0, .. } if resource == "_0.pay"
    ));

    // Matching versions on every stream open cleanly.
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    write_stream(&storage, "_0.doc", DOC_CODEC, VERSION_CURRENT);
    write_stream(&storage, "_0.pos", POS_CODEC, VERSION_CURRENT);
    write_stream(&storage, "_0.pay", PAY_CODEC, VERSION_CURRENT);
    let reader = PostingsReader::open(&storage, &segment, "", &infos).unwrap();
    assert_eq!(reader.version(), VERSION_CURRENT);
}

#[test]
fn test_missing_positions_stream() {
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqsAndPositions);
    let terms = vec![vec![
        Posting {
            doc: 1,
            freq: 1,
            positions: vec![4],
        },
        Posting {
            doc: 5,
            freq: 2,
            positions: vec![0, 9],
        },
    ]];
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    write_postings(&storage, &segment, &field, &terms);
    storage.delete_file("_0.pos").unwrap();

    let infos = FieldInfos::new(vec![field]).unwrap();
    assert!(PostingsReader::open(&storage, &segment, "", &infos).is_err());
}

#[test]
fn test_corruption_detected() {
    let mut rng = StdRng::seed_from_u64(77);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let terms = vec![random_postings(&mut rng, 1000, 20, 5)];

    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let segment = segment_for("_0", &terms);
    write_postings(&storage, &segment, &field, &terms);
    let original = storage.read_file("_0.doc").unwrap();

    // A flipped byte keeps the footer intact but fails the checksum.
    let mut damaged = original.clone();
    let middle = damaged.len() / 2;
    damaged[middle] ^= 0xff;
    storage.put_file("_0.doc", damaged);
    let reader = open_reader(&storage, &segment, &field);
    let err = reader.check_integrity().unwrap_err();
    assert!(matches!(err, TesseraError::Corrupt { .. }));

    // A truncated file has no footer where one is expected.
    let truncated = original[..original.len() - 4].to_vec();
    storage.put_file("_0.doc", truncated);
    let infos = FieldInfos::new(vec![field]).unwrap();
    let err = PostingsReader::open(&storage, &segment, "", &infos).unwrap_err();
    assert!(matches!(err, TesseraError::Corrupt { .. }));
}

#[test]
fn test_file_storage_round_trip() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let config = StorageConfig::File(FileStorageConfig::new(temp_dir.path()));
    let storage = StorageFactory::create(config)?;

    let mut rng = StdRng::seed_from_u64(12);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqsAndPositions);
    let terms = vec![
        random_postings(&mut rng, 513, 30, 4),
        random_postings(&mut rng, 17, 30, 4),
    ];
    let segment = segment_for("_7", &terms);
    let states = write_postings(storage.as_ref(), &segment, &field, &terms);

    let mut files = storage.list_files()?;
    files.sort();
    assert_eq!(files, vec!["_7.doc".to_string(), "_7.pos".to_string()]);

    let mut reader = open_reader(storage.as_ref(), &segment, &field);
    reader.check_integrity()?;
    for (postings, state) in terms.iter().zip(states.iter()) {
        let mut positions = reader.docs_and_positions(&field, state, None, None)?;
        for posting in postings {
            assert_eq!(positions.next_doc()?, Some(posting.doc));
            for &position in &posting.positions {
                assert_eq!(positions.next_position()?, position);
            }
        }
        assert_eq!(positions.next_doc()?, None);
    }
    reader.close()?;
    Ok(())
}
