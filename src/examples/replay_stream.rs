use collabvis::dataset::{FieldValues, MemoryDataset, MemorySource, StructuredGrid};
use collabvis::protocol::MessageType;
use collabvis::*;
use std::sync::Arc;

/// Server-side message writer, enough to script a session.
struct Script(Vec<u8>);

impl Script {
    fn tag(&mut self, ty: MessageType) -> &mut Self {
        self.0.extend_from_slice(&(ty as i16).to_be_bytes());
        self
    }

    fn int(&mut self, v: i32) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn float(&mut self, v: f32) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn byte(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    fn string(&mut self, s: &str) -> &mut Self {
        self.int(s.len() as i32);
        self.0.extend_from_slice(s.as_bytes());
        self
    }
}

fn main() -> anyhow::Result<()> {
    logging::init("info");
    println!("🌀 Replaying a scripted server stream");

    // A 16^3 sphere distance field
    let n = 16usize;
    let grid = StructuredGrid::new([n, n, n], [1.0; 3]);
    let distance: Vec<f32> = (0..grid.sample_count())
        .map(|i| {
            let [x, y, z] = grid.coords(i);
            let c = (n as f32 - 1.0) / 2.0;
            ((x as f32 - c).powi(2) + (y as f32 - c).powi(2) + (z as f32 - c).powi(2)).sqrt()
        })
        .collect();
    let source = MemorySource::new();
    source.insert(
        "sphere.vtk",
        MemoryDataset::new(grid).with_point_field("distance", 1, FieldValues::F32(distance)),
    );

    let session = Arc::new(Session::new(Arc::new(source)));
    let mut router = Router::new();
    router.add_listener(session.clone());

    let mut s = Script(Vec::new());
    s.tag(MessageType::AddVtkDataset).int(0).string("sphere.vtk").int(1).int(0).int(0);
    s.tag(MessageType::AddSubDataset).int(0).int(0).string("sphere").int(-1);
    s.tag(MessageType::MoveDataset).int(0).int(0).int(1).float(0.0).float(1.5).float(-2.0);
    // Triangular Gaussian on the distance field, gradient-driven
    s.tag(MessageType::TfDataset).int(0).int(0).int(1);
    s.byte(1).int(0).float(1.0).int(1).int(0).float(0.5).float(0.2);

    // Deliver in small, uneven chunks like a congested socket would
    let bytes = s.0;
    let mut offset = 0;
    let mut chunk = 1;
    while offset < bytes.len() {
        let end = (offset + chunk).min(bytes.len());
        router.push(&bytes[offset..end])?;
        offset = end;
        chunk = chunk % 7 + 1;
    }
    println!("📦 {} bytes, {} messages dispatched", bytes.len(), router.dispatched());

    let loaded = session.load_pending()?;
    println!("📥 Loaded {} field(s)", loaded);

    let store = session.store();
    let store = store.read();
    let dataset = store.dataset(0).ok_or(Error::UnknownDataset(0))?;
    let view = store.require_subdataset(SubDatasetKey::new(0, 0))?;
    println!(
        "   '{}' at {:?}, changes {:?}",
        view.name(),
        view.state().position,
        view.take_changes()
    );

    if let Some(tf) = view.transfer_function() {
        let classified = dataset.classify(&tf)?;
        let visible = classified.iter().filter(|(a, _)| *a > 0.05).count();
        println!(
            "🎨 Transfer function of dimension {}: {} of {} samples visible",
            tf.dimension(),
            visible,
            classified.len()
        );
    }

    Ok(())
}
