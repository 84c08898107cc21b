//! Whole frames driven through the public API on the CPU-backed device.

use glam::{Mat4, Vec2, Vec3};
use strix_engine::device::{Command, MemoryDevice, PipelineKind};
use strix_engine::draw::vertex::ModelVertex;
use strix_engine::draw::{ClothMesh, Drawable, FluidQuad, Quad};
use strix_engine::model::{Mesh, ModelDesc, NodeDesc, Primitive};
use strix_engine::sim::{ClothConfig, ClothSimulation, FluidConfig, FluidSimulation};
use strix_engine::time::FixedStep;
use strix_engine::{Camera, FrameOutcome, RenderError, Renderer, RendererConfig};

fn renderer() -> Renderer<MemoryDevice> {
    Renderer::new(MemoryDevice::new(), RendererConfig::default()).unwrap()
}

fn quad_model_desc<'a>(vertices: &'a [ModelVertex], indices: &'a [u32]) -> ModelDesc<'a> {
    ModelDesc {
        vertices,
        indices,
        nodes: vec![
            NodeDesc::new(Mat4::from_translation(Vec3::X), None).with_mesh(0),
            NodeDesc::new(Mat4::from_scale(Vec3::splat(0.5)), Some(0)).with_mesh(0),
        ],
        meshes: vec![Mesh {
            primitives: vec![Primitive { first_index: 0, index_count: 6, material: None }],
        }],
        ..ModelDesc::default()
    }
}

#[test]
fn mixed_frame_records_every_drawable() {
    let mut r = renderer();
    let camera = Camera::perspective(
        std::f32::consts::FRAC_PI_4,
        1.0,
        0.1,
        100.0,
        Vec3::new(0.0, 0.0, 3.0),
        Vec3::ZERO,
    );

    let mut cloth = ClothSimulation::new(ClothConfig { width: 8, height: 8, ..ClothConfig::default() });
    let mut fluid = FluidSimulation::new(FluidConfig { width: 16, height: 16, ..FluidConfig::default() });
    fluid.splat(Vec2::splat(0.5), Vec2::new(5.0, 0.0), Vec3::ONE);
    let fluid_texture = r.create_fluid_texture(&fluid).unwrap();

    let vertices = [
        ModelVertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::Z, Vec2::ZERO),
        ModelVertex::new(Vec3::new(1.0, -1.0, 0.0), Vec3::Z, Vec2::X),
        ModelVertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::Z, Vec2::Y),
        ModelVertex::new(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, Vec2::ONE),
    ];
    let indices = [0, 1, 2, 2, 1, 3];
    let mut model = r.create_model(&quad_model_desc(&vertices, &indices)).unwrap();

    let mut step = FixedStep::default();
    let outcome = r
        .frame(|r, time| {
            for _ in 0..step.advance(time.dt.max(step.step())) {
                cloth.step(step.step());
                fluid.step(step.step());
            }

            r.submit(&camera, Drawable::Grid)?;
            r.submit(&camera, Drawable::Cloth(&ClothMesh { cloth: &cloth, color: Vec3::ONE, texture: None }))?;
            r.submit(&camera, Drawable::Quad(&Quad::new(Vec2::splat(-0.5), Vec2::splat(0.5), None)))?;
            r.submit(&camera, Drawable::Fluid(&FluidQuad { fluid: &fluid, texture: &fluid_texture }))?;
            r.submit(&camera, Drawable::Model(&mut model))
        })
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);

    let commands = r.commands();
    // grid + cloth + quad + fluid + one per model mesh node
    assert_eq!(commands.draw_count(), 6);
    let pipelines: Vec<PipelineKind> = commands
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::BindPipeline(kind) => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        pipelines,
        vec![PipelineKind::Grid, PipelineKind::Basic, PipelineKind::Model]
    );

    // the dye reached the fluid texture
    let dye = r.device().image_level(fluid_texture.image(), 0, 0).unwrap();
    assert!(dye.iter().step_by(4).any(|&red| red > 0));

    // every staged byte was flushed to the heap buffers
    let [vertex, index, uniform] = r.heap_stats();
    assert!(vertex.used > 0 && index.used > 0 && uniform.used > 0);

    model.destroy(r.device_mut());
    fluid_texture.destroy(r.device_mut());
    assert_eq!(r.destroy().live_resources(), 0);
}

#[test]
fn heaps_grow_and_next_frame_reuses_them() {
    let config = RendererConfig {
        frames_in_flight: 1,
        vertex_heap_capacity: 256,
        index_heap_capacity: 256,
        ..RendererConfig::default()
    };
    let mut r = Renderer::new(MemoryDevice::new(), config).unwrap();
    let cloth = ClothSimulation::new(ClothConfig { width: 16, height: 16, ..ClothConfig::default() });
    let mesh = ClothMesh { cloth: &cloth, color: Vec3::ONE, texture: None };

    let outcome = r.frame(|r, _| r.submit(&Camera::identity(), Drawable::Cloth(&mesh))).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
    let grown = r.heap_stats();
    assert!(grown[0].capacity > 256);
    assert_eq!(grown[0].retired, 1);

    // reset destroys the retired buffers; the grown buffer fits without growing again
    r.frame(|r, _| r.submit(&Camera::identity(), Drawable::Cloth(&mesh))).unwrap();
    let again = r.heap_stats();
    assert_eq!(again[0].capacity, grown[0].capacity);
    assert_eq!(again[0].retired, 0);
}

#[test]
fn device_budget_exhaustion_skips_only_that_frame() {
    let mut r = renderer();
    let budget = r.device().allocated_bytes() + 1024;
    r.device_mut().set_budget(Some(budget));

    // 64 × 64 cloth needs a bigger vertex heap than the budget allows
    let big = ClothSimulation::new(ClothConfig { width: 64, height: 64, ..ClothConfig::default() });
    let outcome = r
        .frame(|r, _| {
            r.submit(&Camera::identity(), Drawable::Grid)?;
            r.submit(&Camera::identity(), Drawable::Cloth(&ClothMesh { cloth: &big, color: Vec3::ONE, texture: None }))
        })
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped);
    assert!(r.commands().is_empty());

    let outcome = r.frame(|r, _| r.submit(&Camera::identity(), Drawable::Grid)).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
}

#[test]
fn missing_skybox_directory_is_not_found() {
    let mut r = renderer();
    let live = r.device().live_resources();
    let err = r.create_skybox(std::path::Path::new("no/such/skybox")).unwrap_err();
    assert!(matches!(err, RenderError::NotFound { .. }), "{err:?}");
    assert_eq!(r.device().live_resources(), live);
}
