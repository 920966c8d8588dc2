//! Property tests for the codec, the reassembler and chunked transfers.

use bytes::Bytes;
use obex_engine::protocol::{
    parse_headers, GrowableByteBuffer, HeaderIdentifier, HeaderList, HeaderValue, Request,
    ResponseReassembler, MIN_CAPACITY,
};
use obex_engine::ChunkedPutTransfer;
use proptest::prelude::*;

/// A raw identifier and a value of the kind its top two bits select.
fn header_entry() -> impl Strategy<Value = (u8, HeaderValue)> {
    prop_oneof![
        (0x00u8..0x40, "\\PC{0,24}").prop_map(|(id, s)| (id, HeaderValue::Unicode(s))),
        (0x40u8..0x80, prop::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(id, b)| (id, HeaderValue::ByteSequence(Bytes::from(b)))),
        (0x80u8..0xC0, any::<u8>()).prop_map(|(id, v)| (id, HeaderValue::Int8(v))),
        (0xC0u8..=0xFF, any::<u32>()).prop_map(|(id, v)| (id, HeaderValue::Int32(v))),
    ]
}

/// Frames with arbitrary opcodes and payloads (payloads are not parsed).
fn frames() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(
        (any::<u8>(), prop::collection::vec(any::<u8>(), 0..40)),
        1..8,
    )
    .prop_map(|frames| {
        frames
            .into_iter()
            .map(|(opcode, payload)| {
                let length = (3 + payload.len()) as u16;
                let mut frame = vec![opcode];
                frame.extend_from_slice(&length.to_be_bytes());
                frame.extend_from_slice(&payload);
                frame
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn header_list_roundtrip(entries in prop::collection::vec(header_entry(), 0..12)) {
        let mut list = HeaderList::new();
        for (id, value) in entries {
            list.add(HeaderIdentifier::from(id)).value = value;
        }

        let bytes = list.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), list.encoded_len());
        prop_assert_eq!(parse_headers(&bytes).unwrap(), list);
    }

    #[test]
    fn buffer_capacity_doubles_and_zero_fills(lengths in prop::collection::vec(0usize..5000, 1..10)) {
        let mut buf = GrowableByteBuffer::new();
        for n in lengths {
            let previous = buf.len();
            if previous > 0 {
                buf.set_bytes(0, &vec![0xAA; previous]).unwrap();
            }
            buf.set_length(n);

            prop_assert_eq!(buf.len(), n);
            prop_assert!(buf.capacity() >= n);
            let ratio = buf.capacity() / MIN_CAPACITY;
            prop_assert_eq!(buf.capacity() % MIN_CAPACITY, 0);
            prop_assert!(ratio.is_power_of_two());
            if n > previous {
                prop_assert!(buf.as_slice()[previous..].iter().all(|&b| b == 0));
            }
        }
    }

    #[test]
    fn reassembly_is_independent_of_chunking(
        frames in frames(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
        empties in prop::collection::vec(any::<bool>(), 0..12),
    ) {
        let stream: Vec<u8> = frames.concat();

        let mut whole = ResponseReassembler::new();
        let expected: Vec<(u8, Bytes)> = whole
            .push(&stream)
            .unwrap()
            .into_iter()
            .map(|r| (r.opcode(), r.payload))
            .collect();
        prop_assert_eq!(expected.len(), frames.len());

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(stream.len() + 1)).collect();
        points.push(0);
        points.push(stream.len());
        points.sort_unstable();
        points.dedup();

        // Feed one chunk per call and drain with empty chunks, the way the
        // exchange drives it.
        let mut split = ResponseReassembler::new();
        let mut actual = Vec::new();
        for (i, window) in points.windows(2).enumerate() {
            if empties.get(i).copied().unwrap_or(false) {
                if let Some(r) = split.add_data(&[]).unwrap() {
                    actual.push((r.opcode(), r.payload));
                }
            }
            let mut next = split.add_data(&stream[window[0]..window[1]]).unwrap();
            while let Some(r) = next {
                actual.push((r.opcode(), r.payload));
                next = split.add_data(&[]).unwrap();
            }
        }

        prop_assert_eq!(actual, expected);
        prop_assert!(split.is_empty());
    }

    #[test]
    fn chunked_put_packet_count(len in 0usize..5000, chunk_size in 1usize..700) {
        let data = vec![0x5Au8; len];
        let mut transfer = ChunkedPutTransfer::new("object", data)
            .unwrap()
            .with_chunk_size(chunk_size)
            .unwrap();

        let ack = obex_engine::protocol::ResponsePacket::decode(
            Bytes::from_static(&[0x90, 0x00, 0x03]),
        )
        .unwrap();

        let mut chunks = Vec::new();
        while let Some(chunk) = transfer.next_chunk() {
            transfer.complete(&chunk, &ack).unwrap();
            chunks.push(chunk);
        }

        let expected = if len == 0 { 1 } else { len.div_ceil(chunk_size) };
        prop_assert_eq!(chunks.len(), expected);

        let first = chunks[0].request.headers();
        prop_assert_eq!(first.get_u32(HeaderIdentifier::Length).unwrap(), Some(len as u32));

        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            let headers = chunk.request.headers();
            let is_last = i == last;
            prop_assert_eq!(chunk.is_final, is_last);
            prop_assert_eq!(chunk.request.opcode(), if is_last { 0x82 } else { 0x02 });
            prop_assert_eq!(headers.contains(HeaderIdentifier::EndOfBody), is_last);
            prop_assert_eq!(headers.contains(HeaderIdentifier::Body), !is_last);
            if i > 0 {
                prop_assert!(!headers.contains(HeaderIdentifier::Length));
            }
        }
        prop_assert_eq!(transfer.offset(), len);
        prop_assert!(transfer.is_complete());
    }
}
