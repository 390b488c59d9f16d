mod common;

use collabvis::error::Error;
use collabvis::protocol::kinds::{AddVtkDataset, CurrentAction, HeadsetStatus};
use collabvis::protocol::{Command, Descriptor, HeadsetUpdate, Message, MessageType, Router, TfKind};
use common::{collecting_router, StreamWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn add_vtk(w: &mut StreamWriter) {
    w.tag(MessageType::AddVtkDataset)
        .int(4)
        .string("grid.vtk")
        .int(3)
        .int(0)
        .int(2)
        .int(5)
        .int(1)
        .int(0);
}

fn session_stream() -> StreamWriter {
    let mut w = StreamWriter::new();
    add_vtk(&mut w);
    w.tag(MessageType::AddSubDataset).int(4).int(0).string("left").int(-1);

    // merge of a Gaussian and a triangular Gaussian
    w.tag(MessageType::TfDataset).int(4).int(0).int(2);
    w.byte(TfKind::Merge as u8).int(0).float(0.25);
    w.gaussian_tf(TfKind::Gaussian as u8, 1, 1.0, &[(0, 0.5, 0.2)]);
    w.gaussian_tf(TfKind::TriangularGaussian as u8, 0, 0.8, &[(2, 0.3, 0.1), (-1, 0.6, 0.2)]);

    w.tag(MessageType::VolumetricMask).int(4).int(0).byte(1).bytes(&[0xff, 0x0f, 0x01]);

    w.tag(MessageType::HeadsetsStatus).int(2);
    for (id, color) in [(1, 0xff0000), (2, 0x00ff00)] {
        w.int(id).int(color);
        for v in [0.0, 1.6, -0.5, 1.0, 0.0, 0.0, 0.0] {
            w.float(v);
        }
    }

    w.tag(MessageType::StartAnchoring);
    w.tag(MessageType::Lasso).int(2).float(0.1).float(0.2).float(0.8).float(0.9);
    w.tag(MessageType::AddNewSelectionInput).short(1);
    w
}

fn decode_in_chunks(bytes: &[u8], chunks: impl Iterator<Item = usize>) -> Vec<Message> {
    let (mut router, seen) = collecting_router();
    let mut offset = 0;
    for len in chunks {
        if offset >= bytes.len() {
            break;
        }
        let end = (offset + len).min(bytes.len());
        router.push(&bytes[offset..end]).unwrap();
        offset = end;
    }
    assert_eq!(offset, bytes.len());
    assert!(router.is_idle());
    let out = seen.lock().clone();
    out
}

#[test]
fn test_any_chunking_decodes_the_same_messages() {
    let bytes = session_stream().to_bytes();

    let (mut router, seen) = collecting_router();
    assert_eq!(router.push(&bytes).unwrap(), 8);
    let whole = seen.lock().clone();

    let kinds: Vec<_> = whole.iter().map(Message::message_type).collect();
    assert_eq!(
        kinds,
        vec![
            MessageType::AddVtkDataset,
            MessageType::AddSubDataset,
            MessageType::TfDataset,
            MessageType::VolumetricMask,
            MessageType::HeadsetsStatus,
            MessageType::StartAnchoring,
            MessageType::Lasso,
            MessageType::AddNewSelectionInput,
        ]
    );

    let bytewise = decode_in_chunks(&bytes, std::iter::repeat(1));
    assert_eq!(bytewise, whole);

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let sizes: Vec<usize> = (0..bytes.len()).map(|_| rng.gen_range(1..=17)).collect();
        assert_eq!(decode_in_chunks(&bytes, sizes.into_iter()), whole);
    }
}

#[test]
fn test_decoded_fields() {
    let bytes = session_stream().to_bytes();
    let (mut router, seen) = collecting_router();
    router.push(&bytes).unwrap();
    let seen = seen.lock();

    match &seen[2] {
        Message::TfDataset(m) => {
            assert_eq!((m.dataset_id, m.subdataset_id, m.headset_id), (4, 0, 2));
            let merge = m.tf.merge.as_ref().unwrap();
            assert_eq!(merge.t, 0.25);
            assert_eq!(merge.first.body().props[0].center, 0.5);
            assert_eq!(merge.second.body().kind, Some(TfKind::TriangularGaussian));
            assert_eq!(merge.second.body().props[1].prop_id, -1);
        }
        other => panic!("unexpected {:?}", other),
    }
    match &seen[3] {
        Message::VolumetricMask(m) => {
            assert!(m.enabled);
            assert_eq!(m.mask, vec![0xff, 0x0f, 0x01]);
        }
        other => panic!("unexpected {:?}", other),
    }
    match &seen[4] {
        Message::HeadsetsStatus(m) => {
            assert_eq!(m.headsets.len(), 2);
            assert_eq!(
                m.headsets[1],
                HeadsetStatus {
                    id: 2,
                    color: 0x00ff00,
                    position: [0.0, 1.6, -0.5],
                    rotation: [1.0, 0.0, 0.0, 0.0],
                }
            );
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_add_vtk_dataset_split_at_every_byte() {
    let mut w = StreamWriter::new();
    add_vtk(&mut w);
    let bytes = w.to_bytes();
    let expected = Message::AddVtkDataset(AddVtkDataset {
        dataset_id: 4,
        path: "grid.vtk".into(),
        pt_field_indices: vec![0, 2, 5],
        cell_field_indices: vec![0],
    });

    for split in 0..=bytes.len() {
        let (mut router, seen) = collecting_router();
        let first = router.push(&bytes[..split]).unwrap();
        let second = router.push(&bytes[split..]).unwrap();
        assert_eq!(first + second, 1, "split at {}", split);
        assert_eq!(seen.lock().as_slice(), &[expected.clone()]);
    }

    let body = match expected {
        Message::AddVtkDataset(body) => body,
        _ => unreachable!(),
    };
    // id, path, point count, 3 point indices, cell count, 1 cell index
    assert_eq!(Descriptor::new(body).max_cursor(), 3 + 3 + 1);
}

#[test]
fn test_fieldless_message_dispatches_on_its_tag() {
    let (mut router, seen) = collecting_router();
    assert_eq!(router.push(&[0]).unwrap(), 0);
    assert!(!router.is_idle());
    assert_eq!(router.push(&[18]).unwrap(), 1);
    assert_eq!(seen.lock().as_slice(), &[Message::StartAnchoring]);
    assert!(router.is_idle());
}

#[test]
fn test_unknown_tag_resets_the_router() {
    let (mut router, seen) = collecting_router();

    let mut w = StreamWriter::new();
    w.tag(MessageType::MoveDataset).int(1);
    router.push(&w.to_bytes()).unwrap();
    assert_eq!(router.in_flight(), Some(MessageType::MoveDataset));
    router.reset();

    let mut w = StreamWriter::new();
    w.short(0x7f7f).tag(MessageType::CurrentAction).int(3);
    assert!(matches!(
        router.push(&w.to_bytes()),
        Err(Error::UnknownMessageType(0x7f7f))
    ));
    assert!(router.is_idle());
    assert!(seen.lock().is_empty());

    let mut w = StreamWriter::new();
    w.tag(MessageType::CurrentAction).int(3);
    assert_eq!(router.push(&w.to_bytes()).unwrap(), 1);
    assert_eq!(
        seen.lock().as_slice(),
        &[Message::CurrentAction(CurrentAction { action: 3 })]
    );
}

#[test]
fn test_blob_length_limits() {
    let mut router = Router::with_max_blob_len(Some(4));
    let mut w = StreamWriter::new();
    w.tag(MessageType::AnchoringDataSegment).bytes(&[0; 8]);
    assert!(matches!(
        router.push(&w.to_bytes()),
        Err(Error::BlobTooLarge { len: 8, max: 4 })
    ));
    assert!(router.is_idle());

    let mut w = StreamWriter::new();
    w.tag(MessageType::AnchoringDataSegment).int(-1);
    assert!(matches!(router.push(&w.to_bytes()), Err(Error::InvalidLength(-1))));
    assert!(router.is_idle());
}

#[test]
fn test_headset_update_layout() {
    let cmd = Command::HeadsetUpdate(HeadsetUpdate {
        position: [1.0, 2.0, 3.0],
        rotation: [1.0, 0.0, 0.0, 0.0],
        ..HeadsetUpdate::default()
    });
    let bytes = cmd.encode().unwrap();
    assert_eq!(&bytes[..2], &[0, 1]);
    assert_eq!(&bytes[2..6], &1.0f32.to_be_bytes());
    assert_eq!(&bytes[10..14], &3.0f32.to_be_bytes());
    assert_eq!(&bytes[14..18], &1.0f32.to_be_bytes());
    assert_eq!(Command::decode(&bytes).unwrap(), cmd);
}
