mod common;

use std::sync::Arc;

use collabvis::dataset::{
    FieldValues, MemoryDataset, MemorySource, StructuredGrid, SubDatasetChanges, SubDatasetKey,
};
use collabvis::protocol::{MessageListener, MessageType, Router, TfKind};
use collabvis::session::Session;
use common::StreamWriter;

const CUBE: &str = "cube.vtk";
// (1, 1, 1) and (4, 4, 4) on the 6 x 6 x 6 grid
const NAN_B: usize = 43;
const NAN_A: usize = 172;

/// 6 x 6 x 6 grid with `a = x` and `b = z`, one interior NaN in each field.
fn cube_source() -> Arc<MemorySource> {
    let grid = StructuredGrid::new([6, 6, 6], [1.0; 3]);
    let n = grid.sample_count();
    let mut a: Vec<f32> = (0..n).map(|i| grid.coords(i)[0] as f32).collect();
    let mut b: Vec<f32> = (0..n).map(|i| grid.coords(i)[2] as f32).collect();
    a[grid.index(4, 4, 4)] = f32::NAN;
    b[grid.index(1, 1, 1)] = f32::NAN;

    let source = Arc::new(MemorySource::new());
    source.insert(
        CUBE,
        MemoryDataset::new(grid)
            .with_point_field("a", 1, FieldValues::F32(a))
            .with_point_field("b", 1, FieldValues::F32(b)),
    );
    source
}

fn pipeline() -> (Router, Arc<Session>) {
    let session = Arc::new(Session::new(cube_source()));
    let router = Router::new();
    router.add_listener(Arc::clone(&session) as Arc<dyn MessageListener>);
    (router, session)
}

fn open_cube(w: &mut StreamWriter) {
    w.tag(MessageType::AddVtkDataset)
        .int(1)
        .string(CUBE)
        .int(2)
        .int(0)
        .int(1)
        .int(0);
    w.tag(MessageType::AddSubDataset).int(1).int(0).string("main").int(-1);
}

#[test]
fn test_stream_to_store() {
    let (mut router, session) = pipeline();
    let mut w = StreamWriter::new();
    open_cube(&mut w);
    w.tag(MessageType::MoveDataset).int(1).int(0).int(3).float(0.5).float(1.0).float(-2.0);
    w.tag(MessageType::RenameSubDataset).int(1).int(0).string("renamed");
    for chunk in w.to_bytes().chunks(5) {
        router.push(chunk).unwrap();
    }

    let store = session.store();
    let key = SubDatasetKey::new(1, 0);
    {
        let store = store.read();
        let ds = store.dataset(1).unwrap();
        assert!(!ds.field(0).unwrap().is_loaded());
        let sd = store.subdataset(key).unwrap();
        assert_eq!(sd.name(), "renamed");
        assert_eq!(sd.state().position, [0.5, 1.0, -2.0]);
        assert_eq!(
            sd.take_changes(),
            SubDatasetChanges::POSITION | SubDatasetChanges::NAME
        );
    }

    assert_eq!(session.pending_loads(), 1);
    assert_eq!(session.load_pending().unwrap(), 2);
    assert_eq!(session.pending_loads(), 0);
    assert!(store.read().dataset(1).unwrap().field(1).unwrap().is_loaded());
}

#[test]
fn test_nan_in_any_field_masks_the_sample() {
    let (mut router, session) = pipeline();
    let mut w = StreamWriter::new();
    open_cube(&mut w);
    router.push(&w.to_bytes()).unwrap();
    session.load_pending().unwrap();

    let store = session.store();
    let store = store.read();
    let ds = store.dataset(1).unwrap();
    let mask = ds.mask().unwrap();
    assert!(!mask.is_valid(NAN_B));
    assert!(!mask.is_valid(NAN_A));
    assert_eq!(mask.count_valid(), 214);
    assert_eq!(ds.field(0).unwrap().range(), Some((0.0, 5.0)));
    assert_eq!(ds.field(1).unwrap().range(), Some((0.0, 5.0)));
}

#[test]
fn test_gradient_faces_and_masked_samples_are_zero() {
    let (mut router, session) = pipeline();
    let mut w = StreamWriter::new();
    open_cube(&mut w);
    router.push(&w.to_bytes()).unwrap();
    session.load_pending().unwrap();

    let store = session.store();
    let store = store.read();
    let ds = store.dataset(1).unwrap();
    let gradient = ds.gradient(&[0, 1]).unwrap();
    let grid = ds.grid();
    for sample in 0..grid.sample_count() {
        let [x, y, z] = grid.coords(sample);
        if grid.is_boundary(x, y, z) {
            assert_eq!(gradient.values[sample], 0.0, "face sample {}", sample);
        }
    }
    assert_eq!(gradient.values[NAN_B], 0.0);
    assert_eq!(gradient.values[NAN_A], 0.0);
    assert!(gradient.max_magnitude > 0.0);
}

#[test]
fn test_merged_transfer_function_routes_the_gradient() {
    let (mut router, session) = pipeline();
    let mut w = StreamWriter::new();
    open_cube(&mut w);
    // t = 1: the result is the triangular Gaussian, which uses the gradient
    w.tag(MessageType::TfDataset).int(1).int(0).int(-1);
    w.byte(TfKind::Merge as u8).int(0).float(1.0);
    w.gaussian_tf(TfKind::Gaussian as u8, 0, 1.0, &[(0, 0.5, 0.3), (1, 0.5, 0.3)]);
    w.gaussian_tf(TfKind::TriangularGaussian as u8, 0, 1.0, &[(0, 0.5, 0.3)]);
    router.push(&w.to_bytes()).unwrap();
    session.load_pending().unwrap();

    let store = session.store();
    let store = store.read();
    let sd = store.subdataset(SubDatasetKey::new(1, 0)).unwrap();
    assert!(sd.take_changes().contains(SubDatasetChanges::TRANSFER_FUNCTION));
    let tf = sd.transfer_function().unwrap();
    // both children have two slots; the gradient gets a third
    assert_eq!(tf.dimension(), 3);
    assert!(tf.has_gradient());

    let ds = store.dataset(1).unwrap();
    let classified = ds.classify(&tf).unwrap();
    assert_eq!(classified.len(), 216);
    assert_eq!(classified[NAN_B], (0.0, 0.0));
    assert_eq!(classified[NAN_A], (0.0, 0.0));

    let grid = ds.grid();
    for sample in 0..grid.sample_count() {
        let [x, y, z] = grid.coords(sample);
        if grid.is_boundary(x, y, z) {
            // zero gradient on the faces: fully transparent
            assert_eq!(classified[sample].0, 0.0, "face sample {}", sample);
        }
    }
    assert!(classified.iter().any(|&(alpha, _)| alpha > 0.0));
}
