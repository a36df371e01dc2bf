//! Transpose Chunk Encoder
//!
//! Shreds records into the per-tag buffers and transition stream described
//! in the module docs. Records stay staged until `encode_and_close`, which
//! replays them last-first so buffers land in exactly the order the decoder
//! consumes them.

use std::collections::HashMap;

use bytes::Bytes;
use chunkstream_core::{varint, Chain, ChunkType, Error, Result};

use crate::chunk::simple::MAX_RECORD_SIZE;
use crate::chunk::Chunk;
use crate::compress::Compressor;
use crate::config::CompressorOptions;
use crate::io::{write_varint64, ChainWriter, Writer};

use super::{
    key_field, key_wire_type, Node, NodeKind, MAX_SHRED_DEPTH, WIRE_FIXED32, WIRE_FIXED64,
    WIRE_LENGTH_DELIMITED, WIRE_VARINT,
};

/// One transition token plus the value bytes it consumes, in decode order.
struct Token {
    node: u32,
    value: Option<Bytes>,
}

/// A staged record: its token stream (already reversed into decode order).
struct StagedRecord {
    tokens: Vec<Token>,
}

pub struct TransposeEncoder {
    options: CompressorOptions,
    nodes: Vec<Node>,
    node_index: HashMap<(NodeKind, u32, u32), u32>,
    records: Vec<StagedRecord>,
    num_records: u64,
    decoded_size: u64,
}

impl TransposeEncoder {
    pub fn new(options: CompressorOptions) -> Self {
        Self {
            options,
            nodes: Vec::new(),
            node_index: HashMap::new(),
            records: Vec::new(),
            num_records: 0,
            decoded_size: 0,
        }
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn decoded_size(&self) -> u64 {
        self.decoded_size
    }

    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        if record.len() as u64 > MAX_RECORD_SIZE {
            return Err(Error::RecordTooLarge(record.len() as u64));
        }
        if self.num_records == u64::MAX {
            return Err(Error::TooManyRecords);
        }
        self.decoded_size = self
            .decoded_size
            .checked_add(record.len() as u64)
            .ok_or_else(|| Error::SizeOverflow("decoded data size".to_string()))?;

        let mut forward = Vec::new();
        let staged = if valid_message(record) {
            self.shred_message(record, 0, 0, &mut forward);
            forward.reverse();
            StagedRecord { tokens: forward }
        } else {
            let node = self.intern(NodeKind::NonProto, 0, 0);
            StagedRecord {
                tokens: vec![Token {
                    node,
                    value: Some(Bytes::copy_from_slice(record)),
                }],
            }
        };
        self.records.push(staged);
        self.num_records += 1;
        Ok(())
    }

    fn intern(&mut self, kind: NodeKind, parent: u32, tag_key: u32) -> u32 {
        if let Some(&id) = self.node_index.get(&(kind, parent, tag_key)) {
            return id;
        }
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::leaf(kind, parent, tag_key));
        self.node_index.insert((kind, parent, tag_key), id);
        id
    }

    /// Emits forward-order tokens for a message already known to be valid.
    ///
    /// `depth` bounds submessage recursion; deeper payloads stay opaque
    /// Bytes values.
    fn shred_message(&mut self, message: &[u8], parent: u32, depth: usize, out: &mut Vec<Token>) {
        let mut cursor = message;
        while !cursor.is_empty() {
            let key = decode_u32_varint(&mut cursor).expect("validated message");
            match key_wire_type(key) {
                WIRE_VARINT => {
                    let raw = take_raw_varint(&mut cursor).expect("validated message");
                    let node = self.intern(NodeKind::Varint, parent, key);
                    out.push(Token {
                        node,
                        value: Some(Bytes::copy_from_slice(raw)),
                    });
                }
                WIRE_FIXED64 => {
                    let (value, rest) = cursor.split_at(8);
                    cursor = rest;
                    let node = self.intern(NodeKind::Fixed64, parent, key);
                    out.push(Token {
                        node,
                        value: Some(Bytes::copy_from_slice(value)),
                    });
                }
                WIRE_FIXED32 => {
                    let (value, rest) = cursor.split_at(4);
                    cursor = rest;
                    let node = self.intern(NodeKind::Fixed32, parent, key);
                    out.push(Token {
                        node,
                        value: Some(Bytes::copy_from_slice(value)),
                    });
                }
                WIRE_LENGTH_DELIMITED => {
                    let len = varint::decode_u64(&mut cursor).expect("validated message") as usize;
                    let (payload, rest) = cursor.split_at(len);
                    cursor = rest;
                    if depth < MAX_SHRED_DEPTH && !payload.is_empty() && valid_message(payload) {
                        let start = self.intern(NodeKind::SubmessageStart, parent, key);
                        let end = self.intern(NodeKind::SubmessageEnd, 0, 0);
                        out.push(Token {
                            node: start,
                            value: None,
                        });
                        self.shred_message(payload, start + 1, depth + 1, out);
                        out.push(Token {
                            node: end,
                            value: None,
                        });
                    } else {
                        let node = self.intern(NodeKind::Bytes, parent, key);
                        out.push(Token {
                            node,
                            value: Some(Bytes::copy_from_slice(payload)),
                        });
                    }
                }
                _ => unreachable!("validated message"),
            }
        }
    }

    /// Finalizes the chunk.
    pub fn encode_and_close(mut self) -> Result<Chunk> {
        let (buffer_of_node, bucket_of_buffer, num_buffers, num_buckets) = self.assign_buffers();

        // Fill buffers by replaying staged records last-first.
        let mut buffers: Vec<ChainWriter> = (0..num_buffers).map(|_| ChainWriter::new()).collect();
        for record in self.records.iter().rev() {
            for token in &record.tokens {
                let node = &self.nodes[token.node as usize];
                write_varint64(&mut buffers[0], token.node as u64 + 1)?;
                match node.kind {
                    NodeKind::Varint | NodeKind::Fixed32 | NodeKind::Fixed64 => {
                        let value = token.value.as_ref().expect("value node");
                        let buffer = buffer_of_node[token.node as usize];
                        buffers[buffer as usize].write(value)?;
                    }
                    NodeKind::Bytes | NodeKind::NonProto => {
                        let value = token.value.as_ref().expect("value node");
                        let lengths = buffer_of_node[token.node as usize];
                        write_varint64(&mut buffers[lengths as usize], value.len() as u64)?;
                        buffers[lengths as usize + 1].write(value)?;
                    }
                    NodeKind::SubmessageStart | NodeKind::SubmessageEnd => {}
                    NodeKind::NoOp => unreachable!("encoder never emits NoOp"),
                }
            }
            write_varint64(&mut buffers[0], 0)?; // record boundary
        }

        // Patch buffer indices into the serialized nodes.
        for (id, node) in self.nodes.iter_mut().enumerate() {
            let buffer = buffer_of_node[id];
            match node.kind {
                NodeKind::Varint | NodeKind::Fixed32 | NodeKind::Fixed64 => node.buffer = buffer,
                NodeKind::Bytes | NodeKind::NonProto => {
                    node.buffer = buffer;
                    node.buffer2 = buffer + 1;
                }
                _ => {}
            }
        }

        let buffer_chains: Vec<Chain> = buffers
            .into_iter()
            .map(ChainWriter::into_chain)
            .collect();

        // Compress one bucket per group of buffers.
        let mut bucket_blobs: Vec<Chain> = Vec::with_capacity(num_buckets as usize);
        for bucket in 0..num_buckets {
            let mut compressor = Compressor::new(self.options);
            for (index, chain) in buffer_chains.iter().enumerate() {
                if bucket_of_buffer[index] == bucket {
                    compressor.writer().write_chain(chain)?;
                }
            }
            bucket_blobs.push(compressor.encode_and_close_to_chain()?);
        }

        // Serialize and compress the header.
        let mut header = ChainWriter::new();
        write_varint64(&mut header, num_buckets as u64)?;
        for blob in &bucket_blobs {
            write_varint64(&mut header, blob.len() as u64)?;
        }
        write_varint64(&mut header, num_buffers as u64)?;
        for (index, chain) in buffer_chains.iter().enumerate() {
            write_varint64(&mut header, bucket_of_buffer[index] as u64)?;
            write_varint64(&mut header, chain.len() as u64)?;
        }
        write_varint64(&mut header, self.nodes.len() as u64)?;
        for node in &self.nodes {
            header.write(&[node.kind as u8])?;
            write_varint64(&mut header, node.implicit_next as u64)?;
            match node.kind {
                NodeKind::Varint | NodeKind::Fixed32 | NodeKind::Fixed64 => {
                    write_varint64(&mut header, node.parent as u64)?;
                    write_varint64(&mut header, node.tag_key as u64)?;
                    write_varint64(&mut header, node.buffer as u64)?;
                }
                NodeKind::Bytes => {
                    write_varint64(&mut header, node.parent as u64)?;
                    write_varint64(&mut header, node.tag_key as u64)?;
                    write_varint64(&mut header, node.buffer as u64)?;
                    write_varint64(&mut header, node.buffer2 as u64)?;
                }
                NodeKind::SubmessageStart => {
                    write_varint64(&mut header, node.parent as u64)?;
                    write_varint64(&mut header, node.tag_key as u64)?;
                }
                NodeKind::NonProto => {
                    write_varint64(&mut header, node.buffer as u64)?;
                    write_varint64(&mut header, node.buffer2 as u64)?;
                }
                NodeKind::SubmessageEnd | NodeKind::NoOp => {}
            }
        }
        let mut header_compressor = Compressor::new(self.options);
        header_compressor
            .writer()
            .write_chain_owned(header.into_chain())?;
        let header_blob = header_compressor.encode_and_close_to_chain()?;

        // Assemble the chunk data.
        let mut dest = ChainWriter::new();
        dest.write(&[
            ChunkType::Transpose as u8,
            self.options.compression_type() as u8,
        ])?;
        write_varint64(&mut dest, header_blob.len() as u64)?;
        dest.write_chain_owned(header_blob)?;
        for blob in bucket_blobs {
            dest.write_chain_owned(blob)?;
        }

        Ok(Chunk::new(
            dest.into_chain(),
            self.num_records,
            self.decoded_size,
        ))
    }

    /// Assigns buffer indices to nodes and buckets to buffers.
    ///
    /// Buffer 0 is the transition stream in bucket 0. NonProto buffers join
    /// bucket 0; every other value buffer lands in the bucket of its
    /// top-level field.
    fn assign_buffers(&self) -> (Vec<u32>, Vec<u32>, u32, u32) {
        let mut buffer_of_node = vec![0u32; self.nodes.len()];
        let mut bucket_of_buffer = vec![0u32]; // transitions
        let mut bucket_of_field: HashMap<u32, u32> = HashMap::new();
        let mut next_bucket = 1u32;

        for (id, node) in self.nodes.iter().enumerate() {
            let buffer_count = match node.kind {
                NodeKind::Varint | NodeKind::Fixed32 | NodeKind::Fixed64 => 1,
                NodeKind::Bytes | NodeKind::NonProto => 2,
                _ => continue,
            };
            let bucket = if node.kind == NodeKind::NonProto {
                0
            } else {
                let field = self.top_level_field(id as u32);
                *bucket_of_field.entry(field).or_insert_with(|| {
                    let bucket = next_bucket;
                    next_bucket += 1;
                    bucket
                })
            };
            buffer_of_node[id] = bucket_of_buffer.len() as u32;
            for _ in 0..buffer_count {
                bucket_of_buffer.push(bucket);
            }
        }
        let num_buffers = bucket_of_buffer.len() as u32;
        (buffer_of_node, bucket_of_buffer, num_buffers, next_bucket)
    }

    fn top_level_field(&self, mut id: u32) -> u32 {
        loop {
            let node = &self.nodes[id as usize];
            if node.parent == 0 {
                return key_field(node.tag_key);
            }
            id = node.parent - 1;
        }
    }
}

/// Decodes a varint that must fit a proto key (u32) and be minimally
/// encoded.
fn decode_u32_varint(cursor: &mut &[u8]) -> Option<u32> {
    let before = cursor.len();
    let value = varint::decode_u64(cursor).ok()?;
    if value > u32::MAX as u64 || !varint::is_minimal_len(value, before - cursor.len()) {
        return None;
    }
    Some(value as u32)
}

/// Consumes a raw varint (any encoding up to 10 bytes), returning its bytes.
fn take_raw_varint<'a>(cursor: &mut &'a [u8]) -> Option<&'a [u8]> {
    for (i, &byte) in cursor.iter().enumerate() {
        if i >= varint::MAX_VARINT64_LEN {
            return None;
        }
        if byte & 0x80 == 0 {
            let (raw, rest) = cursor.split_at(i + 1);
            *cursor = rest;
            return Some(raw);
        }
    }
    None
}

/// Whether `message` parses, one level deep, as protobuf wire format the
/// shredder can reproduce byte-identically: minimal key and length varints,
/// known wire types. Length-delimited payloads stay opaque here; the
/// shredder re-checks each level as it descends.
fn valid_message(message: &[u8]) -> bool {
    let mut cursor = message;
    while !cursor.is_empty() {
        let Some(key) = decode_u32_varint(&mut cursor) else {
            return false;
        };
        if key_field(key) == 0 {
            return false;
        }
        match key_wire_type(key) {
            WIRE_VARINT => {
                if take_raw_varint(&mut cursor).is_none() {
                    return false;
                }
            }
            WIRE_FIXED64 => {
                if cursor.len() < 8 {
                    return false;
                }
                cursor = &cursor[8..];
            }
            WIRE_FIXED32 => {
                if cursor.len() < 4 {
                    return false;
                }
                cursor = &cursor[4..];
            }
            WIRE_LENGTH_DELIMITED => {
                let before = cursor.len();
                let Ok(len) = varint::decode_u64(&mut cursor) else {
                    return false;
                };
                if !varint::is_minimal_len(len, before - cursor.len()) {
                    return false;
                }
                if (cursor.len() as u64) < len {
                    return false;
                }
                cursor = &cursor[len as usize..];
            }
            _ => return false, // groups and unknown wire types
        }
    }
    true
}
