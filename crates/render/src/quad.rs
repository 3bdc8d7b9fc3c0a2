use crate::backend::{BackendError, BufferHandle, GraphicsBackend, Vertex};

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// The four corners of the viewport in normalized device coordinates.
pub const FULL_SCREEN_QUAD_VERTICES: [Vertex; 4] = [
    // Bottom left.
    Vertex::new([-1.0, -1.0, 0.0], WHITE),
    // Bottom right.
    Vertex::new([1.0, -1.0, 0.0], WHITE),
    // Top left.
    Vertex::new([-1.0, 1.0, 0.0], WHITE),
    // Top right.
    Vertex::new([1.0, 1.0, 0.0], WHITE),
];

/// Two clockwise triangles (y up) covering the viewport without overlap.
pub const FULL_SCREEN_QUAD_INDICES: [u32; 6] = [0, 2, 3, 3, 1, 0];

/// Index and vertex buffer pair ready to be drawn as a triangle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
    pub primitive_count: u32,
}

impl GpuMesh {
    /// Upload a triangle list. Trailing indices that do not form a full
    /// triangle are not drawn.
    pub fn upload<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<Self, BackendError> {
        let vertices_handle = backend.create_vertex_buffer(label, vertices)?;
        let indices_handle = backend.create_index_buffer(label, indices)?;
        Ok(Self {
            vertices: vertices_handle,
            indices: indices_handle,
            primitive_count: (indices.len() / 3) as u32,
        })
    }
}

/// Lazily created full-screen quad used to start one ray per pixel.
#[derive(Debug, Default)]
pub struct FullScreenQuad {
    mesh: Option<GpuMesh>,
}

impl FullScreenQuad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.mesh.is_some()
    }

    pub fn mesh(&self) -> Option<GpuMesh> {
        self.mesh
    }

    /// Upload the quad geometry unless it already exists.
    pub fn ensure_built<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<GpuMesh, BackendError> {
        if let Some(mesh) = self.mesh {
            return Ok(mesh);
        }

        let mesh = GpuMesh::upload(
            backend,
            "full_screen_quad",
            &FULL_SCREEN_QUAD_VERTICES,
            &FULL_SCREEN_QUAD_INDICES,
        )?;
        tracing::info!(?mesh, "full screen quad created");
        self.mesh = Some(mesh);
        Ok(mesh)
    }
}
