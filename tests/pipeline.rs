use std::{
    any::Any,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cgmath::Point3;
use voxel_streaming::{
    BlockRecord, BlockRegistry, BlockSide, BoxCuller, Chunk, ChunkManager, ChunkMesher,
    ChunkPosition, ChunkState, FaceCountMesh, FaceCountMesher, FlatTerrain, GenerationError,
    MeshHandle, MeshingError, NoCulling, TerrainGrid, TerrainRequest, WorldConfig,
};
use web_time::Instant;

const EDGE: usize = 8;

fn config(load_radius: i32, unload_radius: i32) -> WorldConfig {
    WorldConfig {
        load_radius,
        unload_radius,
        generation_workers: 3,
        meshing_workers: 2,
        chunk_edge: EDGE,
        chunk_height: EDGE,
        ..WorldConfig::default()
    }
}

fn flat_manager(config: WorldConfig) -> (ChunkManager, Arc<BlockRegistry>) {
    let registry = Arc::new(BlockRegistry::default());
    let stone = registry.require("stone").unwrap();
    let manager = ChunkManager::new(
        config,
        FlatTerrain::new(4, stone),
        FaceCountMesher::new(registry.clone()),
        registry.clone(),
    )
    .unwrap();
    (manager, registry)
}

/// World-space centre of a chunk's bottom layer.
fn world_of(chunk: ChunkPosition) -> Point3<f32> {
    let half = EDGE as f32 / 2.0;
    Point3::new(
        chunk.x as f32 * EDGE as f32 + half,
        chunk.y as f32 * EDGE as f32 + 0.5,
        chunk.z as f32 * EDGE as f32 + half,
    )
}

fn face_visible(manager: &ChunkManager, chunk: ChunkPosition, local: Point3<i32>, side: BlockSide) -> bool {
    manager.chunk(chunk).unwrap().with_mesh(|mesh| {
        mesh.and_then(|mesh| mesh.as_any().downcast_ref::<FaceCountMesh>())
            .map(|mesh| mesh.is_visible(local, side))
            .unwrap()
    })
}

#[test]
fn streams_chunks_around_a_moving_observer() {
    let (mut manager, _) = flat_manager(config(2, 4));
    let origin = ChunkPosition::new(0, 0, 0);

    manager.update(world_of(origin));
    assert!(manager.wait_until_idle(Duration::from_secs(20)));

    assert_eq!(manager.chunk_count(), 33);
    for position in manager.tracked_positions() {
        assert!(origin.distance_to(position) <= 2.0);
        let chunk = manager.chunk(position).unwrap();
        assert_eq!(chunk.state(), ChunkState::Ready);
        assert!(chunk.is_mesh_generated());
        assert!(!chunk.is_dirty());
    }

    let target = ChunkPosition::new(10, 0, 0);
    manager.update(world_of(target));
    assert_eq!(manager.observer_chunk(), target);
    for position in manager.tracked_positions() {
        assert!(target.distance_to(position) <= 4.0);
    }
    assert!(manager.chunk(origin).is_none());

    assert!(manager.wait_until_idle(Duration::from_secs(20)));
    let mut tracked = manager.tracked_positions();
    tracked.sort();
    let mut expected: Vec<ChunkPosition> = (-2..=2)
        .flat_map(|x| (-2..=2).flat_map(move |y| (-2..=2).map(move |z| (x, y, z))))
        .map(|(x, y, z)| ChunkPosition::new(10 + x, y, z))
        .filter(|position| target.within_radius(*position, 2))
        .collect();
    expected.sort();
    assert_eq!(tracked, expected);

    let stats = manager.stats();
    assert_eq!(stats.meshed, 33);
    assert_eq!(stats.chunks_generated, 66);
    assert_eq!(stats.generation_failures, 0);
    assert!(manager.shutdown());
}

#[test]
fn border_edit_dirties_the_linked_neighbor() {
    let (mut manager, registry) = flat_manager(config(1, 3));
    let stone = BlockRecord::from_raw(registry.require("stone").unwrap());
    manager.update(world_of(ChunkPosition::new(0, 0, 0)));
    assert!(manager.wait_until_idle(Duration::from_secs(20)));

    let a = manager.chunk(ChunkPosition::new(0, 0, 0)).unwrap();
    let b = manager.chunk(ChunkPosition::new(-1, 0, 0)).unwrap();
    assert!(a.neighbors().face(BlockSide::LEFT).is_some());

    // Local x = 0 in chunk A, above the ground.
    assert!(manager.set_block(Point3::new(0, 6, 3), stone));
    assert!(a.is_dirty());
    assert!(b.is_dirty());

    assert!(manager.wait_until_idle(Duration::from_secs(20)));
    let block = Point3::new(0, 6, 3);
    assert!(face_visible(&manager, ChunkPosition::new(0, 0, 0), block, BlockSide::LEFT));
    assert!(face_visible(&manager, ChunkPosition::new(0, 0, 0), block, BlockSide::TOP));

    // Filling the cell across the border hides both shared faces.
    assert!(manager.set_block(Point3::new(-1, 6, 3), stone));
    assert!(manager.wait_until_idle(Duration::from_secs(20)));
    assert!(!face_visible(&manager, ChunkPosition::new(0, 0, 0), block, BlockSide::LEFT));
    assert!(!face_visible(
        &manager,
        ChunkPosition::new(-1, 0, 0),
        Point3::new(EDGE as i32 - 1, 6, 3),
        BlockSide::RIGHT
    ));
    manager.shutdown();
}

#[test]
fn losing_a_neighbor_reopens_the_border_faces() {
    let (mut manager, registry) = flat_manager(config(1, 2));
    let origin = ChunkPosition::new(0, 0, 0);
    manager.update(world_of(origin));
    assert!(manager.wait_until_idle(Duration::from_secs(20)));

    let ground = Point3::new(0, 1, 3);
    let floor = Point3::new(3, 0, 3);
    assert!(!face_visible(&manager, origin, ground, BlockSide::LEFT));
    assert!(!face_visible(&manager, origin, floor, BlockSide::BOTTOM));

    // The origin chunk stays inside the unload radius; its west and lower neighbors leave.
    manager.update(world_of(ChunkPosition::new(2, 0, 0)));
    assert!(manager.chunk(ChunkPosition::new(-1, 0, 0)).is_none());
    assert!(manager.chunk(ChunkPosition::new(0, -1, 0)).is_none());
    assert!(manager.wait_until_idle(Duration::from_secs(20)));

    let chunk = manager.chunk(origin).unwrap();
    assert!(chunk.is_face_visible(ground, BlockSide::LEFT, &registry));
    assert!(face_visible(&manager, origin, ground, BlockSide::LEFT));
    assert!(face_visible(&manager, origin, floor, BlockSide::BOTTOM));
    // The east neighbor is still linked, so that border stays hidden.
    assert!(!face_visible(&manager, origin, Point3::new(EDGE as i32 - 1, 1, 3), BlockSide::RIGHT));
    manager.shutdown();
}

#[test]
fn generation_failures_stay_with_their_chunk() {
    let registry = Arc::new(BlockRegistry::default());
    let stone = registry.require("stone").unwrap();
    let broken = ChunkPosition::new(1, 0, 0);
    let panicking = ChunkPosition::new(-1, 0, 0);
    let generator = move |request: &TerrainRequest| -> Result<TerrainGrid, GenerationError> {
        if request.position == broken {
            return Err(GenerationError::Generator("bad seed".to_string()));
        }
        if request.position == panicking {
            panic!("generator bug");
        }
        Ok(TerrainGrid::from_fn(request.dimensions(), |_, y, _| {
            if y < 2 {
                stone
            } else {
                0
            }
        }))
    };
    let mut manager = ChunkManager::new(
        config(1, 3),
        generator,
        FaceCountMesher::new(registry.clone()),
        registry,
    )
    .unwrap();

    let observer = world_of(ChunkPosition::new(0, 0, 0));
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        manager.update(observer);
        let healthy_done = manager
            .tracked_positions()
            .into_iter()
            .filter(|position| *position != broken && *position != panicking)
            .all(|position| manager.chunk(position).unwrap().is_mesh_generated());
        let retried = [broken, panicking]
            .iter()
            .all(|position| manager.chunk(*position).is_some_and(|chunk| chunk.failure_streak() >= 2));
        if healthy_done && retried {
            break;
        }
        assert!(Instant::now() < deadline, "healthy chunks never finished");
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(manager.chunk_count(), 7);
    assert!(manager.stats().generation_failures >= 4);
    assert!(!manager.chunk(broken).unwrap().is_generated());
    assert!(!manager.chunk(panicking).unwrap().is_generated());
    let visible = manager.get_visible_chunks(&NoCulling);
    assert_eq!(visible.len(), 5);
    assert!(visible
        .iter()
        .all(|chunk| chunk.position() != broken && chunk.position() != panicking));
    manager.shutdown();
}

#[test]
fn visibility_query_respects_the_culler() {
    let (mut manager, _) = flat_manager(config(1, 2));
    manager.update(world_of(ChunkPosition::new(0, 0, 0)));
    assert!(manager.wait_until_idle(Duration::from_secs(20)));

    assert_eq!(manager.get_visible_chunks(&NoCulling).len(), 7);

    let inner = BoxCuller::new(Point3::new(1.0, 1.0, 1.0), Point3::new(7.0, 7.0, 7.0));
    let visible = manager.get_visible_chunks(&inner);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].position(), ChunkPosition::new(0, 0, 0));

    let above = |bounds: &voxel_streaming::BoundingBox| bounds.min.y >= EDGE as f32;
    let visible = manager.get_visible_chunks(&above);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].position(), ChunkPosition::new(0, 1, 0));
    manager.shutdown();
}

#[test]
fn stale_generation_jobs_are_dropped() {
    let registry = Arc::new(BlockRegistry::default());
    let slow = |request: &TerrainRequest| -> Result<TerrainGrid, GenerationError> {
        thread::sleep(Duration::from_millis(10));
        Ok(TerrainGrid::new(request.dimensions()))
    };
    let config = WorldConfig {
        generation_workers: 1,
        ..config(2, 6)
    };
    let mut manager =
        ChunkManager::new(config, slow, FaceCountMesher::new(registry.clone()), registry).unwrap();

    manager.update(world_of(ChunkPosition::new(0, 0, 0)));
    manager.update(world_of(ChunkPosition::new(3, 0, 0)));
    assert!(manager.wait_until_idle(Duration::from_secs(30)));

    let stats = manager.stats();
    assert!(stats.dropped_jobs > 0);
    assert_eq!(stats.tracked, 33);
    assert!(manager
        .tracked_positions()
        .iter()
        .all(|position| ChunkPosition::new(3, 0, 0).within_radius(*position, 2)));
    manager.shutdown();
}

/// Fails for one chunk, panics for another and meshes the rest normally.
struct FlakyMesher {
    inner: FaceCountMesher,
    broken: ChunkPosition,
    panicking: ChunkPosition,
}

impl ChunkMesher for FlakyMesher {
    fn build(&self, chunk: &Chunk) -> Result<Box<dyn MeshHandle>, MeshingError> {
        if chunk.position() == self.broken {
            return Err(MeshingError::Mesher("out of vertex space".to_string()));
        }
        if chunk.position() == self.panicking {
            panic!("mesher bug");
        }
        self.inner.build(chunk)
    }
}

#[test]
fn meshing_failures_leave_the_chunk_dirty_for_retry() {
    let registry = Arc::new(BlockRegistry::default());
    let stone = registry.require("stone").unwrap();
    let broken = ChunkPosition::new(0, 0, 1);
    let panicking = ChunkPosition::new(0, 0, -1);
    let mesher = FlakyMesher {
        inner: FaceCountMesher::new(registry.clone()),
        broken,
        panicking,
    };
    let mut manager =
        ChunkManager::new(config(1, 3), FlatTerrain::new(4, stone), mesher, registry).unwrap();

    let observer = world_of(ChunkPosition::new(0, 0, 0));
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        manager.update(observer);
        let retried = [broken, panicking]
            .iter()
            .all(|position| manager.chunk(*position).is_some_and(|chunk| chunk.failure_streak() >= 2));
        if retried && manager.stats().meshed == 5 {
            break;
        }
        assert!(Instant::now() < deadline, "failing chunks were never retried");
        thread::sleep(Duration::from_millis(2));
    }

    // Let in-flight builds finish without scheduling new ones.
    while manager.stats().pending_meshing > 0 {
        assert!(Instant::now() < deadline, "meshing never drained");
        thread::sleep(Duration::from_millis(1));
    }

    for position in [broken, panicking] {
        let chunk = manager.chunk(position).unwrap();
        assert_eq!(chunk.state(), ChunkState::Ready);
        assert!(chunk.is_dirty());
        assert!(!chunk.is_mesh_generated());
    }
    let stats = manager.stats();
    assert!(stats.meshing_failures >= 4);
    assert_eq!(stats.generation_failures, 0);
    assert!(!manager.is_idle());
    assert_eq!(manager.get_visible_chunks(&NoCulling).len(), 5);
    manager.shutdown();
}

struct CountedMesh {
    released: Arc<AtomicUsize>,
}

impl MeshHandle for CountedMesh {
    fn release(self: Box<Self>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct CountingMesher {
    built: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ChunkMesher for CountingMesher {
    fn build(&self, _chunk: &Chunk) -> Result<Box<dyn MeshHandle>, MeshingError> {
        self.built.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedMesh {
            released: self.released.clone(),
        }))
    }
}

#[test]
fn every_built_mesh_is_released_once() {
    let registry = Arc::new(BlockRegistry::default());
    let stone = registry.require("stone").unwrap();
    let mesher = CountingMesher::default();
    let built = mesher.built.clone();
    let released = mesher.released.clone();
    let mut manager =
        ChunkManager::new(config(1, 3), FlatTerrain::new(4, stone), mesher, registry).unwrap();

    let live = || built.load(Ordering::SeqCst) - released.load(Ordering::SeqCst);

    manager.update(world_of(ChunkPosition::new(0, 0, 0)));
    assert!(manager.wait_until_idle(Duration::from_secs(20)));
    // Neighbors linking in may have forced rebuilds; each chunk still holds one mesh.
    assert_eq!(live(), 7);
    let built_before = built.load(Ordering::SeqCst);
    let released_before = released.load(Ordering::SeqCst);

    // An interior edit rebuilds only its own chunk and replaces the old mesh.
    assert!(manager.set_block(Point3::new(3, 6, 3), BlockRecord::from_raw(stone)));
    assert!(manager.wait_until_idle(Duration::from_secs(20)));
    assert_eq!(built.load(Ordering::SeqCst), built_before + 1);
    assert_eq!(released.load(Ordering::SeqCst), released_before + 1);

    // Leaving the area unloads every chunk and its mesh.
    manager.update(world_of(ChunkPosition::new(20, 0, 0)));
    assert!(manager.chunk(ChunkPosition::new(0, 0, 0)).is_none());
    assert!(released.load(Ordering::SeqCst) >= released_before + 8);
    assert!(manager.wait_until_idle(Duration::from_secs(20)));
    assert_eq!(live(), 7);

    assert!(manager.shutdown());
    assert_eq!(built.load(Ordering::SeqCst), released.load(Ordering::SeqCst));
}
