//! Node-hierarchy models.
//!
//! A model is an arena: nodes, meshes, materials and textures live in flat
//! vectors and refer to each other by index. Parent links are only followed
//! upward for matrix accumulation; traversal goes through the precomputed
//! roots and child lists.
//!
//! Every model owns one skin buffer per skin per frame in flight, each with
//! one matrix slot per node. Mesh nodes without a skin write into an extra
//! implicit skin.

use glam::{Mat4, Vec4};

use crate::device::{
    align_up,
    BindingDesc,
    BindingId,
    BufferDesc,
    BufferId,
    BufferUsage,
    GpuDevice,
    ResourceScope,
};
use crate::draw::vertex::ModelVertex;
use crate::error::{RenderError, Result};
use crate::heap::StagingHeap;
use crate::texture::{ImageDecoder, Texture, TextureDesc};
use crate::Renderer;

pub type NodeId = usize;
pub type MeshId = usize;
pub type SkinId = usize;
pub type MaterialId = usize;
pub type TextureId = usize;

const MATRIX_SIZE: u64 = size_of::<[f32; 16]>() as u64;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NodeDesc {
    pub local: Mat4,
    pub parent: Option<NodeId>,
    pub mesh: Option<MeshId>,
    pub skin: Option<SkinId>,
}

impl NodeDesc {
    pub fn new(local: Mat4, parent: Option<NodeId>) -> Self {
        Self { local, parent, mesh: None, skin: None }
    }

    pub fn with_mesh(mut self, mesh: MeshId) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_skin(mut self, skin: SkinId) -> Self {
        self.skin = Some(skin);
        self
    }
}

/// Index sub-range of the model's shared index buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Primitive {
    pub first_index: u32,
    pub index_count: u32,
    pub material: Option<MaterialId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Material {
    pub base_color_factor: Vec4,
    pub base_color: Option<TextureId>,
    pub normal: Option<TextureId>,
    pub alpha_cutoff: f32,
    pub alpha_mask: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            base_color: None,
            normal: None,
            alpha_cutoff: 0.5,
            alpha_mask: false,
        }
    }
}

/// Everything a model is built from. Parsing asset files into this is the
/// caller's business.
#[derive(Debug, Clone, Default)]
pub struct ModelDesc<'a> {
    pub vertices: &'a [ModelVertex],
    pub indices: &'a [u32],
    pub nodes: Vec<NodeDesc>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    /// Number of explicit skins; node `skin` ids index `0..skins`.
    pub skins: usize,
    pub textures: Vec<TextureDesc<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub local: Mat4,
    pub parent: Option<NodeId>,
    pub mesh: Option<MeshId>,
    pub skin: Option<SkinId>,
    pub children: Vec<NodeId>,
}

/// One skin's matrices for one frame in flight.
#[derive(Debug)]
pub struct SkinFrame {
    pub(crate) buffer: BufferId,
    pub(crate) binding: BindingId,
    pub(crate) matrices: Vec<Mat4>,
}

impl SkinFrame {
    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    #[inline]
    pub fn binding(&self) -> BindingId {
        self.binding
    }

    /// Matrices written by the last submission that used this frame slot.
    #[inline]
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    pub(crate) fn upload<D: GpuDevice + ?Sized>(&self, device: &mut D) -> Result<()> {
        let columns: Vec<[f32; 16]> = self.matrices.iter().map(Mat4::to_cols_array).collect();
        device.write_buffer(self.buffer, 0, bytemuck::cast_slice(&columns))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Model {
    pub(crate) nodes: Vec<Node>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) meshes: Vec<Mesh>,
    pub(crate) materials: Vec<Material>,
    pub(crate) textures: Vec<Texture>,
    pub(crate) vertex_buffer: BufferId,
    pub(crate) index_buffer: BufferId,
    /// `[frame][skin]`; the last skin of every frame is the implicit one.
    pub(crate) skins: Vec<Vec<SkinFrame>>,

    /// World transform applied on top of the node hierarchy.
    pub transform: Mat4,
    /// Light parameter forwarded to the model uniform.
    pub light: Vec4,
}

impl Model {
    /// Uploads `desc` through the renderer's staging heap.
    ///
    /// All-or-nothing: a failure releases every buffer, texture and binding
    /// acquired so far.
    pub fn upload<D: GpuDevice>(renderer: &mut Renderer<D>, desc: &ModelDesc<'_>) -> Result<Self> {
        let (device, staging, decoder, frames_in_flight) = renderer.upload_parts();
        Self::upload_with(device, staging, decoder, frames_in_flight, desc)
    }

    pub(crate) fn upload_with<D: GpuDevice + ?Sized>(
        device: &mut D,
        staging: &mut StagingHeap,
        decoder: &dyn ImageDecoder,
        frames_in_flight: usize,
        desc: &ModelDesc<'_>,
    ) -> Result<Self> {
        validate_references(desc)?;
        let (roots, children) = build_forest(&desc.nodes)?;

        let copy_alignment = device.limits().copy_alignment;
        let mut scope = ResourceScope::new(device);

        let vertex_bytes: &[u8] = bytemuck::cast_slice(desc.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(desc.indices);
        let vertex_buffer = create_buffer(&mut scope, "strix model vertices", vertex_bytes.len() as u64, copy_alignment, BufferUsage::Vertex)?;
        let index_buffer = create_buffer(&mut scope, "strix model indices", index_bytes.len() as u64, copy_alignment, BufferUsage::Index)?;

        let mut textures = Vec::with_capacity(desc.textures.len());
        for texture in &desc.textures {
            textures.push(Texture::create_in(&mut scope, staging, decoder, texture)?);
        }

        staging.upload_buffers(scope.device(), &[(vertex_buffer, vertex_bytes), (index_buffer, index_bytes)])?;

        let skin_size = desc.nodes.len() as u64 * MATRIX_SIZE;
        let mut skins = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight.max(1) {
            let mut frame = Vec::with_capacity(desc.skins + 1);
            for _ in 0..=desc.skins {
                let buffer = create_buffer(&mut scope, "strix skin", skin_size, copy_alignment, BufferUsage::Storage)?;
                let binding = scope.create_binding(&BindingDesc::Storage { buffer, size: skin_size })?;
                frame.push(SkinFrame {
                    buffer,
                    binding,
                    matrices: vec![Mat4::IDENTITY; desc.nodes.len()],
                });
            }
            skins.push(frame);
        }

        scope.commit();

        let nodes = desc
            .nodes
            .iter()
            .zip(children)
            .map(|(n, children)| Node {
                local: n.local,
                parent: n.parent,
                mesh: n.mesh,
                skin: n.skin,
                children,
            })
            .collect();

        log::debug!(
            "model uploaded: {} nodes, {} meshes, {} textures, {} skins",
            desc.nodes.len(),
            desc.meshes.len(),
            textures.len(),
            desc.skins
        );

        Ok(Self {
            nodes,
            roots,
            meshes: desc.meshes.clone(),
            materials: desc.materials.clone(),
            textures,
            vertex_buffer,
            index_buffer,
            skins,
            transform: Mat4::IDENTITY,
            light: Vec4::new(0.0, -1.0, 0.0, 0.0),
        })
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[inline]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    #[inline]
    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    /// Skin id mesh nodes without an explicit skin write into.
    #[inline]
    pub fn implicit_skin(&self) -> SkinId {
        self.skins.first().map_or(0, |frame| frame.len() - 1)
    }

    pub fn skin_frame(&self, frame: usize, skin: SkinId) -> Option<&SkinFrame> {
        self.skins.get(frame)?.get(skin)
    }

    /// Replaces a node's local transform. Returns `false` for unknown nodes.
    pub fn set_local(&mut self, node: NodeId, local: Mat4) -> bool {
        match self.nodes.get_mut(node) {
            Some(n) => {
                n.local = local;
                true
            }
            None => false,
        }
    }

    /// Product of the local transforms from the root down to `node`:
    /// `root * ... * parent * node`.
    pub fn accumulated_matrix(&self, node: NodeId) -> Option<Mat4> {
        let mut matrix = self.nodes.get(node)?.local;
        let mut parent = self.nodes[node].parent;
        while let Some(p) = parent {
            let ancestor = &self.nodes[p];
            matrix = ancestor.local * matrix;
            parent = ancestor.parent;
        }
        Some(matrix)
    }

    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &mut D) {
        for frame in self.skins.into_iter().rev() {
            for skin in frame.into_iter().rev() {
                device.destroy_binding(skin.binding);
                device.destroy_buffer(skin.buffer);
            }
        }
        for texture in self.textures.into_iter().rev() {
            texture.destroy(device);
        }
        device.destroy_buffer(self.index_buffer);
        device.destroy_buffer(self.vertex_buffer);
    }
}

fn create_buffer<D: GpuDevice + ?Sized>(
    scope: &mut ResourceScope<'_, D>,
    label: &'static str,
    size: u64,
    alignment: u64,
    usage: BufferUsage,
) -> Result<BufferId> {
    let size = align_up(size, alignment);
    scope
        .create_buffer(&BufferDesc { label, size, usage })
        .map_err(|e| RenderError::from_allocation(size, e))
}

fn validate_references(desc: &ModelDesc<'_>) -> Result<()> {
    if desc.nodes.is_empty() {
        return Err(RenderError::invalid("model has no nodes"));
    }
    if desc.vertices.is_empty() || desc.indices.is_empty() {
        return Err(RenderError::invalid("model has no geometry"));
    }

    for (id, node) in desc.nodes.iter().enumerate() {
        if let Some(mesh) = node.mesh.filter(|&m| m >= desc.meshes.len()) {
            return Err(RenderError::invalid(format!("node {id} references missing mesh {mesh}")));
        }
        if let Some(skin) = node.skin.filter(|&s| s >= desc.skins) {
            return Err(RenderError::invalid(format!("node {id} references missing skin {skin}")));
        }
    }

    for (id, mesh) in desc.meshes.iter().enumerate() {
        for p in &mesh.primitives {
            let end = p.first_index as u64 + p.index_count as u64;
            if end > desc.indices.len() as u64 {
                return Err(RenderError::invalid(format!(
                    "mesh {id} primitive {}..{end} exceeds {} indices",
                    p.first_index,
                    desc.indices.len()
                )));
            }
            if let Some(material) = p.material.filter(|&m| m >= desc.materials.len()) {
                return Err(RenderError::invalid(format!("mesh {id} references missing material {material}")));
            }
        }
    }

    for (id, material) in desc.materials.iter().enumerate() {
        for texture in [material.base_color, material.normal].into_iter().flatten() {
            if texture >= desc.textures.len() {
                return Err(RenderError::invalid(format!("material {id} references missing texture {texture}")));
            }
        }
    }
    Ok(())
}

/// Checks that parent links form a forest and returns `(roots, children)`.
fn build_forest(nodes: &[NodeDesc]) -> Result<(Vec<NodeId>, Vec<Vec<NodeId>>)> {
    let mut roots = Vec::new();
    let mut children = vec![Vec::new(); nodes.len()];

    for (id, node) in nodes.iter().enumerate() {
        match node.parent {
            None => roots.push(id),
            Some(parent) if parent >= nodes.len() => {
                return Err(RenderError::invalid(format!("node {id} has missing parent {parent}")));
            }
            Some(parent) => children[parent].push(id),
        }

        // Any chain longer than the node count revisits a node.
        let mut steps = 0;
        let mut cursor = node.parent;
        while let Some(p) = cursor {
            steps += 1;
            if steps > nodes.len() || p == id {
                return Err(RenderError::invalid(format!("node {id} is part of a parent cycle")));
            }
            cursor = nodes.get(p).and_then(|n| n.parent);
        }
    }
    Ok((roots, children))
}
