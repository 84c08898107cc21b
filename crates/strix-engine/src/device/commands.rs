use super::{BindingId, BufferId, ImageId};

/// Pipeline families the draw encoders select.
///
/// Pipeline objects themselves are owned by the backend user; the engine only
/// records which family a draw needs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PipelineKind {
    /// Position / colour / uv vertices with one texture (quads, cloth, fluid).
    Basic,
    /// Same layout as `Basic`, single-channel glyph atlas.
    Text,
    Model,
    Skybox,
    Grid,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 5] = [
        PipelineKind::Basic,
        PipelineKind::Text,
        PipelineKind::Model,
        PipelineKind::Skybox,
        PipelineKind::Grid,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Range into one of the side tables of a [`CommandList`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Span {
    pub start: u32,
    pub len: u32,
}

impl Span {
    #[inline]
    fn range(self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

/// One recorded command.
///
/// Index buffers are always 32-bit.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Command {
    BindPipeline(PipelineKind),
    BindVertexBuffer { buffer: BufferId, offset: u64 },
    BindIndexBuffer { buffer: BufferId, offset: u64 },
    /// Binds `sets` to consecutive slots starting at `first`. Dynamic offsets
    /// are consumed in set order by the sets that take one.
    BindGroups { first: u32, sets: Span, dynamic_offsets: Span },
    DrawIndexed { index_count: u32, first_index: u32, base_vertex: i32 },
    Draw { vertex_count: u32, first_vertex: u32 },
}

/// Position in a [`CommandList`] that recording can be rewound to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CommandMark {
    commands: usize,
    sets: usize,
    offsets: usize,
    pipeline: Option<PipelineKind>,
}

/// Recorded draw stream for one frame.
///
/// - `push`-style recording is O(1)
/// - set and offset lists live in shared side tables, so recording does not
///   allocate once capacity has warmed up
/// - binding the pipeline that is already bound is elided
#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<Command>,
    sets: Vec<BindingId>,
    offsets: Vec<u32>,
    pipeline: Option<PipelineKind>,
}

impl CommandList {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears recorded commands. Keeps allocated capacity for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.commands.clear();
        self.sets.clear();
        self.offsets.clear();
        self.pipeline = None;
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[inline]
    pub fn sets(&self, span: Span) -> &[BindingId] {
        &self.sets[span.range()]
    }

    #[inline]
    pub fn dynamic_offsets(&self, span: Span) -> &[u32] {
        &self.offsets[span.range()]
    }

    /// Number of draw commands (indexed or not).
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed { .. } | Command::Draw { .. }))
            .count()
    }

    pub fn mark(&self) -> CommandMark {
        CommandMark {
            commands: self.commands.len(),
            sets: self.sets.len(),
            offsets: self.offsets.len(),
            pipeline: self.pipeline,
        }
    }

    /// Drops everything recorded after `mark`.
    pub fn rewind(&mut self, mark: CommandMark) {
        self.commands.truncate(mark.commands);
        self.sets.truncate(mark.sets);
        self.offsets.truncate(mark.offsets);
        self.pipeline = mark.pipeline;
    }

    pub fn bind_pipeline(&mut self, kind: PipelineKind) {
        if self.pipeline == Some(kind) {
            return;
        }
        self.pipeline = Some(kind);
        self.commands.push(Command::BindPipeline(kind));
    }

    #[inline]
    pub fn bind_vertex_buffer(&mut self, buffer: BufferId, offset: u64) {
        self.commands.push(Command::BindVertexBuffer { buffer, offset });
    }

    #[inline]
    pub fn bind_index_buffer(&mut self, buffer: BufferId, offset: u64) {
        self.commands.push(Command::BindIndexBuffer { buffer, offset });
    }

    pub fn bind_groups(&mut self, first: u32, sets: &[BindingId], dynamic_offsets: &[u32]) {
        let sets = push_span(&mut self.sets, sets);
        let dynamic_offsets = push_span(&mut self.offsets, dynamic_offsets);
        self.commands.push(Command::BindGroups { first, sets, dynamic_offsets });
    }

    #[inline]
    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.commands.push(Command::DrawIndexed { index_count, first_index, base_vertex });
    }

    #[inline]
    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.commands.push(Command::Draw { vertex_count, first_vertex });
    }
}

fn push_span<T: Copy>(table: &mut Vec<T>, items: &[T]) -> Span {
    let start = table.len() as u32;
    table.extend_from_slice(items);
    Span { start, len: items.len() as u32 }
}

// ── transfers ─────────────────────────────────────────────────────────────

/// One buffer → image copy of a whole mip level of one layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ImageCopyRegion {
    pub buffer_offset: u64,
    /// Source row pitch; a multiple of the device's `copy_row_alignment`.
    pub bytes_per_row: u32,
    pub layer: u32,
    pub mip_level: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Transfer {
    CopyBufferToImage {
        src: BufferId,
        dst: ImageId,
        regions: Vec<ImageCopyRegion>,
    },
    CopyBuffer {
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    },
}

/// Transfers executed by [`GpuDevice::submit_immediate`](super::GpuDevice::submit_immediate).
#[derive(Debug, Clone, Default)]
pub struct TransferList {
    transfers: Vec<Transfer>,
}

impl TransferList {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, transfer: Transfer) {
        self.transfers.push(transfer);
    }

    #[inline]
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
