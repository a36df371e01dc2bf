//! Transpose Chunk Decoder
//!
//! Replays the transition stream through the state machine, writing record
//! bytes into a backward writer. The loop is non-recursive: an explicit
//! submessage stack remembers where each open submessage's bytes end, so
//! arbitrarily deep messages decode in constant stack space and the length
//! of a submessage is known the moment its start token arrives.
//!
//! Before execution the decoder rejects any state machine with a cycle of
//! implicit-next edges (a no-advance loop would never terminate), and
//! resolves each node against the field filter: excluded nodes become
//! skips whose buffers — and therefore buckets — are never touched.
//! Buckets decompress on demand; [`TransposeDecoder::bucket_decompressions`]
//! counts how many actually were.

use chunkstream_core::{varint, Chain, CompressionType, Error, Result};

use crate::chunk::field_filter::FieldFilter;
use crate::chunk::ChunkHeader;
use crate::compress::decompress;
use crate::io::{
    read_u8, read_varint64, BackwardWriter, ChainBackwardWriter, ChainReader, Reader,
    SeekableReader,
};

use super::{key_field, Node, NodeKind, TRANSITIONS_BUFFER};

/// Upper bound on header-declared counts, against hostile allocations.
const MAX_STATE_MACHINE_SIZE: u64 = 1 << 22;

pub struct TransposeDecoder {
    field_filter: FieldFilter,
    bucket_decompressions: u64,
}

struct Bucket {
    compressed: Chain,
    decoded: Option<Chain>,
}

struct BufferMeta {
    bucket: u32,
    decoded_len: u64,
    /// Offset of this buffer inside its bucket's decoded bytes.
    offset: u64,
}

/// Parsed header plus lazily decoded buckets.
struct Context {
    compression: CompressionType,
    buckets: Vec<Bucket>,
    buffers: Vec<BufferMeta>,
    readers: Vec<Option<ChainReader>>,
    nodes: Vec<Node>,
    /// Per node: whether the field filter keeps its output.
    included: Vec<bool>,
    decompressions: u64,
}

impl Context {
    /// Reader for a buffer, decompressing its bucket on first access.
    fn reader(&mut self, index: u32) -> Result<&mut ChainReader> {
        let index = index as usize;
        if self.readers[index].is_none() {
            let meta = &self.buffers[index];
            let bucket = &mut self.buckets[meta.bucket as usize];
            if bucket.decoded.is_none() {
                let decoded_len: u64 = self
                    .buffers
                    .iter()
                    .filter(|b| b.bucket == meta.bucket)
                    .map(|b| b.decoded_len)
                    .sum();
                let compressed = std::mem::take(&mut bucket.compressed);
                bucket.decoded = Some(decompress(self.compression, compressed, Some(decoded_len))?);
                self.decompressions += 1;
            }
            let decoded = bucket.decoded.as_ref().unwrap();
            let slice = decoded.slice(
                meta.offset as usize,
                (meta.offset + meta.decoded_len) as usize,
            );
            self.readers[index] = Some(ChainReader::new(slice));
        }
        Ok(self.readers[index].as_mut().unwrap())
    }
}

impl TransposeDecoder {
    pub fn new(field_filter: FieldFilter) -> Self {
        Self {
            field_filter,
            bucket_decompressions: 0,
        }
    }

    /// Buckets decompressed during the last [`decode`](Self::decode).
    pub fn bucket_decompressions(&self) -> u64 {
        self.bucket_decompressions
    }

    /// Decodes the chunk body (after the type byte) into concatenated
    /// record values and sorted record end positions.
    pub fn decode(
        &mut self,
        header: &ChunkHeader,
        src: &mut ChainReader,
    ) -> Result<(Chain, Vec<u64>)> {
        let mut context = self.parse(src)?;
        detect_implicit_loops(&context.nodes)?;

        // Without filtering every bucket is needed; decode them up front.
        if self.field_filter.includes_all() {
            for index in 0..context.buffers.len() {
                context.reader(index as u32)?;
            }
        }

        let result = self.replay(header, &mut context);
        self.bucket_decompressions = context.decompressions;
        result
    }

    fn parse(&self, src: &mut ChainReader) -> Result<Context> {
        let compression = CompressionType::try_from(read_u8(src)?)?;

        let header_len = read_varint64(src)?;
        if header_len > src.size() - src.pos() {
            return Err(Error::Corruption(
                "transpose header length exceeds chunk data".to_string(),
            ));
        }
        let header_blob = src.read_chain(header_len as usize)?;
        let mut header = ChainReader::new(decompress(compression, header_blob, None)?);

        let num_buckets = read_varint64(&mut header)?;
        if num_buckets == 0 || num_buckets > MAX_STATE_MACHINE_SIZE {
            return Err(Error::Corruption(format!(
                "invalid transpose bucket count: {num_buckets}"
            )));
        }
        let mut bucket_lens = Vec::with_capacity(num_buckets as usize);
        for _ in 0..num_buckets {
            bucket_lens.push(read_varint64(&mut header)?);
        }

        let num_buffers = read_varint64(&mut header)?;
        if num_buffers == 0 || num_buffers > MAX_STATE_MACHINE_SIZE {
            return Err(Error::Corruption(format!(
                "invalid transpose buffer count: {num_buffers}"
            )));
        }
        let mut buffers = Vec::with_capacity(num_buffers as usize);
        let mut bucket_fill = vec![0u64; num_buckets as usize];
        for _ in 0..num_buffers {
            let bucket = read_varint64(&mut header)?;
            if bucket >= num_buckets {
                return Err(Error::Corruption(format!(
                    "buffer references bucket {bucket} of {num_buckets}"
                )));
            }
            let decoded_len = read_varint64(&mut header)?;
            let offset = bucket_fill[bucket as usize];
            bucket_fill[bucket as usize] = offset.checked_add(decoded_len).ok_or_else(|| {
                Error::Corruption("transpose bucket size overflow".to_string())
            })?;
            buffers.push(BufferMeta {
                bucket: bucket as u32,
                decoded_len,
                offset,
            });
        }

        let num_nodes = read_varint64(&mut header)?;
        if num_nodes > MAX_STATE_MACHINE_SIZE {
            return Err(Error::Corruption(format!(
                "invalid state machine size: {num_nodes}"
            )));
        }
        let mut nodes = Vec::with_capacity(num_nodes as usize);
        for _ in 0..num_nodes {
            nodes.push(parse_node(&mut header, num_nodes, num_buffers)?);
        }

        // Node inclusion under the field filter, resolved once per node.
        let included = self.resolve_inclusion(&nodes)?;

        let mut buckets = Vec::with_capacity(num_buckets as usize);
        for len in bucket_lens {
            if len > src.size() - src.pos() {
                return Err(Error::Corruption(
                    "transpose bucket length exceeds chunk data".to_string(),
                ));
            }
            buckets.push(Bucket {
                compressed: src.read_chain(len as usize)?,
                decoded: None,
            });
        }
        if src.pull()? {
            return Err(Error::Corruption(
                "excess data after transpose buckets".to_string(),
            ));
        }

        Ok(Context {
            compression,
            readers: (0..buffers.len()).map(|_| None).collect(),
            buckets,
            buffers,
            nodes,
            included,
            decompressions: 0,
        })
    }

    fn resolve_inclusion(&self, nodes: &[Node]) -> Result<Vec<bool>> {
        let mut included = Vec::with_capacity(nodes.len());
        for (id, node) in nodes.iter().enumerate() {
            let keep = match node.kind {
                NodeKind::SubmessageEnd | NodeKind::NoOp | NodeKind::NonProto => true,
                _ => {
                    let path = field_path(nodes, id as u32)?;
                    self.field_filter.includes(&path)
                }
            };
            included.push(keep);
        }
        Ok(included)
    }

    fn replay(
        &self,
        header: &ChunkHeader,
        context: &mut Context,
    ) -> Result<(Chain, Vec<u64>)> {
        if header.num_records > (1 << 31) {
            return Err(Error::Corruption(format!(
                "transpose record count too large: {}",
                header.num_records
            )));
        }

        // The transition stream is consumed exactly once; take its reader
        // out so value buffers stay reachable through the context.
        context.reader(TRANSITIONS_BUFFER)?;
        let mut transitions = context.readers[TRANSITIONS_BUFFER as usize]
            .take()
            .expect("transitions reader just created");

        let mut dest = ChainBackwardWriter::new();
        let mut stack: Vec<u64> = Vec::new();
        let mut ends_from_back =
            Vec::with_capacity(header.num_records.min(1 << 20) as usize);
        let mut scratch = [0u8; varint::MAX_VARINT64_LEN];

        for _ in 0..header.num_records {
            ends_from_back.push(dest.pos());
            loop {
                let token = read_varint64(&mut transitions)?;
                if token == 0 {
                    break;
                }
                let mut node_id = token - 1;
                loop {
                    if node_id >= context.nodes.len() as u64 {
                        return Err(Error::Corruption(format!(
                            "transition references node {node_id} of {}",
                            context.nodes.len()
                        )));
                    }
                    let node = context.nodes[node_id as usize];
                    let keep = context.included[node_id as usize];
                    match node.kind {
                        NodeKind::Varint => {
                            if keep {
                                let len = read_raw_varint(context.reader(node.buffer)?, &mut scratch)?;
                                dest.write(&scratch[..len])?;
                                write_key(&mut dest, node.tag_key)?;
                            }
                        }
                        NodeKind::Fixed32 => {
                            if keep {
                                let value = context.reader(node.buffer)?.read(4)?;
                                dest.write(&value)?;
                                write_key(&mut dest, node.tag_key)?;
                            }
                        }
                        NodeKind::Fixed64 => {
                            if keep {
                                let value = context.reader(node.buffer)?.read(8)?;
                                dest.write(&value)?;
                                write_key(&mut dest, node.tag_key)?;
                            }
                        }
                        NodeKind::Bytes => {
                            if keep {
                                let len = read_varint64(context.reader(node.buffer)?)?;
                                let data = context.reader(node.buffer2)?.read_chain(len as usize)?;
                                dest.write_chain(&data)?;
                                write_length(&mut dest, len)?;
                                write_key(&mut dest, node.tag_key)?;
                            }
                        }
                        NodeKind::SubmessageEnd => {
                            stack.push(dest.pos());
                        }
                        NodeKind::SubmessageStart => {
                            let end = stack.pop().ok_or_else(|| {
                                Error::Corruption("unbalanced submessage in transitions".to_string())
                            })?;
                            if keep {
                                let len = dest.pos() - end;
                                write_length(&mut dest, len)?;
                                write_key(&mut dest, node.tag_key)?;
                            }
                        }
                        NodeKind::NonProto => {
                            let len = read_varint64(context.reader(node.buffer)?)?;
                            let data = context.reader(node.buffer2)?.read_chain(len as usize)?;
                            dest.write_chain(&data)?;
                        }
                        NodeKind::NoOp => {}
                    }
                    if node.implicit_next == 0 {
                        break;
                    }
                    node_id = node.implicit_next as u64 - 1;
                }
            }
            if !stack.is_empty() {
                return Err(Error::Corruption(
                    "unbalanced submessage in transitions".to_string(),
                ));
            }
        }

        if transitions.pull()? {
            return Err(Error::Corruption(
                "excess transition data after last record".to_string(),
            ));
        }

        let total = dest.pos();
        if self.field_filter.includes_all() && total != header.decoded_data_size {
            return Err(Error::Corruption(format!(
                "decoded size mismatch: expected {}, got {total}",
                header.decoded_data_size
            )));
        }

        let mut limits = Vec::with_capacity(ends_from_back.len());
        for end in ends_from_back.iter().rev() {
            limits.push(total - end);
        }
        Ok((dest.into_chain(), limits))
    }
}

fn parse_node(header: &mut ChainReader, num_nodes: u64, num_buffers: u64) -> Result<Node> {
    let kind = NodeKind::from_u8(read_u8(header)?)?;
    let implicit_next = read_varint64(header)?;
    if implicit_next > num_nodes {
        return Err(Error::Corruption(format!(
            "implicit transition to node {implicit_next} of {num_nodes}"
        )));
    }

    let mut node = Node {
        kind,
        implicit_next: implicit_next as u32,
        parent: 0,
        tag_key: 0,
        buffer: 0,
        buffer2: 0,
    };

    let read_parent_and_tag = |header: &mut ChainReader, node: &mut Node| -> Result<()> {
        let parent = read_varint64(header)?;
        if parent > num_nodes {
            return Err(Error::Corruption(format!(
                "node parent {parent} of {num_nodes}"
            )));
        }
        node.parent = parent as u32;
        let tag_key = read_varint64(header)?;
        if tag_key > u32::MAX as u64 {
            return Err(Error::Corruption("node tag overflows u32".to_string()));
        }
        node.tag_key = tag_key as u32;
        Ok(())
    };

    let read_buffer = |header: &mut ChainReader| -> Result<u32> {
        let buffer = read_varint64(header)?;
        // Buffer 0 is the transition stream; value nodes may not claim it.
        if buffer == 0 || buffer >= num_buffers {
            return Err(Error::Corruption(format!(
                "node references buffer {buffer} of {num_buffers}"
            )));
        }
        Ok(buffer as u32)
    };

    match kind {
        NodeKind::Varint | NodeKind::Fixed32 | NodeKind::Fixed64 => {
            read_parent_and_tag(header, &mut node)?;
            node.buffer = read_buffer(header)?;
        }
        NodeKind::Bytes => {
            read_parent_and_tag(header, &mut node)?;
            node.buffer = read_buffer(header)?;
            node.buffer2 = read_buffer(header)?;
        }
        NodeKind::SubmessageStart => {
            read_parent_and_tag(header, &mut node)?;
        }
        NodeKind::NonProto => {
            node.buffer = read_buffer(header)?;
            node.buffer2 = read_buffer(header)?;
        }
        NodeKind::SubmessageEnd | NodeKind::NoOp => {}
    }
    Ok(node)
}

/// Field path of a node: tag numbers from the root down to the node.
fn field_path(nodes: &[Node], id: u32) -> Result<Vec<u32>> {
    let mut path = Vec::new();
    let mut current = id + 1;
    while current != 0 {
        let node = &nodes[current as usize - 1];
        path.push(key_field(node.tag_key));
        if path.len() > nodes.len() {
            return Err(Error::Corruption("node parent cycle".to_string()));
        }
        current = node.parent;
    }
    path.reverse();
    Ok(path)
}

/// Rejects state machines where implicit transitions can cycle without
/// consuming input, which would make decoding non-terminating.
fn detect_implicit_loops(nodes: &[Node]) -> Result<()> {
    // 0 = unvisited, 1 = in progress, 2 = proven terminating.
    let mut state = vec![0u8; nodes.len()];
    for start in 0..nodes.len() {
        let mut current = start;
        let mut trail = Vec::new();
        while state[current] == 0 {
            state[current] = 1;
            trail.push(current);
            match nodes[current].implicit_next {
                0 => break,
                next => current = next as usize - 1,
            }
        }
        if state[current] == 1 && nodes[current].implicit_next != 0 {
            return Err(Error::Corruption(
                "implicit loop of state machine nodes".to_string(),
            ));
        }
        for visited in trail {
            state[visited] = 2;
        }
        state[current] = 2;
    }
    Ok(())
}

/// Reads one raw varint (terminator byte included) from a buffer.
fn read_raw_varint(src: &mut ChainReader, scratch: &mut [u8]) -> Result<usize> {
    for i in 0..varint::MAX_VARINT64_LEN {
        let byte = read_u8(src)?;
        scratch[i] = byte;
        if byte & 0x80 == 0 {
            return Ok(i + 1);
        }
    }
    Err(Error::Corruption("varint overflow in value buffer".to_string()))
}

/// Prepends a canonical varint.
fn write_length<W: BackwardWriter>(dest: &mut W, value: u64) -> Result<()> {
    let mut buf = [0u8; varint::MAX_VARINT64_LEN];
    let mut cursor = &mut buf[..];
    varint::encode_u64(&mut cursor, value);
    let len = varint::MAX_VARINT64_LEN - cursor.len();
    dest.write(&buf[..len])
}

/// Prepends a field key.
fn write_key<W: BackwardWriter>(dest: &mut W, tag_key: u32) -> Result<()> {
    write_length(dest, tag_key as u64)
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::TransposeEncoder;
    use super::*;
    use crate::chunk::Chunk;
    use crate::config::CompressorOptions;
    use crate::io::{write_varint64, ChainWriter, Writer};
    use chunkstream_core::ChunkType;

    fn decode_chunk(
        chunk: &Chunk,
        filter: FieldFilter,
    ) -> Result<(Chain, Vec<u64>, u64)> {
        let mut decoder = TransposeDecoder::new(filter);
        let mut src = ChainReader::new(chunk.data.slice(1, chunk.data.len()));
        let (values, limits) = decoder.decode(&chunk.header, &mut src)?;
        Ok((values, limits, decoder.bucket_decompressions()))
    }

    fn sample_record(i: u64) -> Vec<u8> {
        // 1: varint, 2: big string, 3: submessage { 1: varint, 2: string },
        // 4: fixed32.
        let mut record = varint_field(1, i);
        record.extend(bytes_field(2, format!("padding-{i}-{}", "x".repeat(50)).as_bytes()));
        let mut sub = varint_field(1, 100 + i);
        sub.extend(bytes_field(2, b"wanted"));
        record.extend(bytes_field(3, &sub));
        record.extend(fixed32_field(4, i as u32));
        record
    }

    fn sample_chunk(n: u64) -> Chunk {
        let mut encoder = TransposeEncoder::new(CompressorOptions::zstd(1).unwrap());
        for i in 0..n {
            encoder.add_record(&sample_record(i)).unwrap();
        }
        encoder.encode_and_close().unwrap()
    }

    // ---------------------------------------------------------------
    // Limits contract
    // ---------------------------------------------------------------

    #[test]
    fn test_limits_sorted_and_match_decoded_size() {
        let chunk = sample_chunk(20);
        let (values, limits, _) = decode_chunk(&chunk, FieldFilter::all()).unwrap();
        assert_eq!(limits.len(), 20);
        assert!(limits.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*limits.last().unwrap(), chunk.header.decoded_data_size);
        assert_eq!(values.len() as u64, chunk.header.decoded_data_size);
    }

    // ---------------------------------------------------------------
    // Field filtering
    // ---------------------------------------------------------------

    #[test]
    fn test_filter_keeps_only_named_paths() {
        let chunk = sample_chunk(8);
        let filter = FieldFilter::include(vec![vec![1], vec![3, 2]]);
        let (values, limits, _) = decode_chunk(&chunk, filter).unwrap();

        // Expected record under the filter: field 1 and field 3 containing
        // only its field 2.
        let mut start = 0u64;
        for (i, &end) in limits.iter().enumerate() {
            let record = values.slice_to_bytes(start as usize, end as usize);
            let mut expected = varint_field(1, i as u64);
            expected.extend(bytes_field(3, &bytes_field(2, b"wanted")));
            assert_eq!(record.as_ref(), expected, "record {i}");
            start = end;
        }
    }

    #[test]
    fn test_filter_skips_unrelated_buckets() {
        let chunk = sample_chunk(8);

        let (_, _, all_buckets) = decode_chunk(&chunk, FieldFilter::all()).unwrap();
        // Buckets: transitions + fields 1, 2, 3, 4.
        assert_eq!(all_buckets, 5);

        let filter = FieldFilter::include(vec![vec![1], vec![3, 2]]);
        let (_, _, touched) = decode_chunk(&chunk, filter).unwrap();
        // Transitions, field 1, field 3. Fields 2 and 4 stay compressed.
        assert_eq!(touched, 3);
    }

    #[test]
    fn test_filter_excluding_everything_yields_empty_records() {
        let chunk = sample_chunk(3);
        let (values, limits, touched) =
            decode_chunk(&chunk, FieldFilter::include(vec![vec![99]])).unwrap();
        assert_eq!(values.len(), 0);
        assert_eq!(limits, vec![0, 0, 0]);
        // Only the transition stream was needed.
        assert_eq!(touched, 1);
    }

    // ---------------------------------------------------------------
    // Hand-built state machines: implicit transitions and loops
    // ---------------------------------------------------------------

    /// Builds an uncompressed transpose chunk from raw parts.
    fn build_raw_chunk(
        num_records: u64,
        decoded_data_size: u64,
        buckets: &[&[u8]],
        buffers: &[(u64, u64)],
        nodes: &[&[u8]],
    ) -> Chunk {
        let mut header = ChainWriter::new();
        write_varint64(&mut header, buckets.len() as u64).unwrap();
        for bucket in buckets {
            write_varint64(&mut header, bucket.len() as u64).unwrap();
        }
        write_varint64(&mut header, buffers.len() as u64).unwrap();
        for &(bucket, len) in buffers {
            write_varint64(&mut header, bucket).unwrap();
            write_varint64(&mut header, len).unwrap();
        }
        write_varint64(&mut header, nodes.len() as u64).unwrap();
        for node in nodes {
            header.write(node).unwrap();
        }
        let header_chain = header.into_chain();

        let mut data = ChainWriter::new();
        data.write(&[ChunkType::Transpose as u8, 0]).unwrap();
        write_varint64(&mut data, header_chain.len() as u64).unwrap();
        data.write_chain_owned(header_chain).unwrap();
        for bucket in buckets {
            data.write(bucket).unwrap();
        }
        Chunk::new(data.into_chain(), num_records, decoded_data_size)
    }

    #[test]
    fn test_implicit_chain_executes_without_tokens() {
        // Node 1: NoOp with implicit next to node 2 (a NonProto copy).
        // Node 2: NonProto reading buffers 1 (lengths) and 2 (data).
        // Transitions: token 1, record end.
        let transitions = &[1u8, 0];
        let lengths = &[3u8];
        let data = b"abc";
        let bucket0: Vec<u8> = [transitions.as_slice(), lengths.as_slice(), data].concat();

        let noop = &[8u8, 2]; // kind NoOp, implicit_next = node 2
        let nonproto = &[7u8, 0, 1, 2]; // kind NonProto, no implicit, buffers 1, 2

        let chunk = build_raw_chunk(
            1,
            3,
            &[&bucket0],
            &[(0, 2), (0, 1), (0, 3)],
            &[noop, nonproto],
        );
        let (values, limits, _) = decode_chunk(&chunk, FieldFilter::all()).unwrap();
        assert_eq!(values.to_bytes().as_ref(), b"abc");
        assert_eq!(limits, vec![3]);
    }

    #[test]
    fn test_implicit_loop_rejected_before_decoding() {
        // Two NoOp nodes chained into a cycle.
        let node1 = &[8u8, 2];
        let node2 = &[8u8, 1];
        let transitions = &[0u8];
        let chunk = build_raw_chunk(1, 0, &[transitions], &[(0, 1)], &[node1, node2]);
        let err = decode_chunk(&chunk, FieldFilter::all()).unwrap_err();
        assert!(err.to_string().contains("implicit loop"));
    }

    #[test]
    fn test_self_loop_rejected() {
        let node = &[8u8, 1]; // implicit_next pointing at itself
        let transitions = &[0u8];
        let chunk = build_raw_chunk(1, 0, &[transitions], &[(0, 1)], &[node]);
        let err = decode_chunk(&chunk, FieldFilter::all()).unwrap_err();
        assert!(err.to_string().contains("implicit loop"));
    }

    // ---------------------------------------------------------------
    // Corruption
    // ---------------------------------------------------------------

    #[test]
    fn test_unbalanced_submessage_rejected() {
        // A SubmessageStart with no matching End token.
        let start = &[5u8, 0, 0, 26]; // kind Start, no implicit, root, key 26
        let transitions = &[1u8, 0];
        let chunk = build_raw_chunk(1, 0, &[transitions], &[(0, 2)], &[start]);
        let err = decode_chunk(&chunk, FieldFilter::all()).unwrap_err();
        assert!(err.to_string().contains("unbalanced submessage"));
    }

    #[test]
    fn test_token_referencing_missing_node_rejected() {
        let transitions = &[9u8, 0];
        let chunk = build_raw_chunk(1, 0, &[transitions], &[(0, 2)], &[]);
        assert!(decode_chunk(&chunk, FieldFilter::all()).is_err());
    }

    #[test]
    fn test_decoded_size_mismatch_rejected() {
        let chunk = sample_chunk(4);
        let lying = Chunk {
            header: ChunkHeader {
                decoded_data_size: chunk.header.decoded_data_size + 1,
                ..chunk.header
            },
            data: chunk.data.clone(),
        };
        let err = decode_chunk(&lying, FieldFilter::all()).unwrap_err();
        assert!(err.to_string().contains("decoded size mismatch"));
    }

    #[test]
    fn test_truncated_bucket_rejected() {
        let chunk = sample_chunk(4);
        let bytes = chunk.data.to_bytes();
        let truncated = Chunk {
            header: chunk.header,
            data: Chain::from(bytes.slice(..bytes.len() - 5)),
        };
        assert!(decode_chunk(&truncated, FieldFilter::all()).is_err());
    }
}
