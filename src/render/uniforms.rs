//! Named uniform values and their mapping onto packed GPU buffers.
//!
//! Programs declare a [`UniformLayout`]: an ordered table of named fields
//! with byte offsets computed under WGSL uniform address space rules, plus
//! named texture slots. At draw time the [`UniformBinder`] walks that table
//! and packs a [`UniformSet`] into bytes; a declared name missing from the
//! set fails the draw immediately rather than leaving stale GPU state.

use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3};

use super::error::RenderError;
use super::TextureHandle;

/// One uniform value, dispatched explicitly at bind time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Mat4(Mat4),
    Bool(bool),
    Texture(TextureHandle),
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<TextureHandle> for UniformValue {
    fn from(v: TextureHandle) -> Self {
        UniformValue::Texture(v)
    }
}

/// Mapping from dotted/indexed uniform names to values for one draw.
///
/// Entries with no counterpart in the program's layout are simply ignored,
/// so a set may carry more lights than a variant's compile-time count.
#[derive(Debug, Clone, Default)]
pub struct UniformSet {
    values: HashMap<String, UniformValue>,
}

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }
}

/// Scalar/vector/matrix field kinds accepted inside the uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Vec2,
    Vec3,
    Mat4,
    Bool,
}

impl FieldKind {
    fn align(self) -> u32 {
        match self {
            FieldKind::Float | FieldKind::Bool => 4,
            FieldKind::Vec2 => 8,
            FieldKind::Vec3 | FieldKind::Mat4 => 16,
        }
    }

    fn size(self) -> u32 {
        match self {
            FieldKind::Float | FieldKind::Bool => 4,
            FieldKind::Vec2 => 8,
            FieldKind::Vec3 => 12,
            FieldKind::Mat4 => 64,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            FieldKind::Float => "float",
            FieldKind::Vec2 => "vec2",
            FieldKind::Vec3 => "vec3",
            FieldKind::Mat4 => "mat4",
            FieldKind::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone)]
struct UniformField {
    name: String,
    kind: FieldKind,
    offset: u32,
}

#[derive(Debug, Clone)]
struct TextureSlot {
    name: String,
    binding: u32,
}

/// Declared uniform interface of a program: packed block fields plus
/// texture slots with their bind group binding indices.
#[derive(Debug, Clone, Default)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    textures: Vec<TextureSlot>,
    block_size: u32,
}

impl UniformLayout {
    /// Size in bytes of the packed uniform block; zero when the program
    /// declares no block fields.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn has_block(&self) -> bool {
        self.block_size > 0
    }

    pub fn texture_bindings(&self) -> impl Iterator<Item = u32> + '_ {
        self.textures.iter().map(|slot| slot.binding)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    #[cfg(test)]
    fn offset_of(&self, name: &str) -> Option<u32> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.offset)
    }
}

/// Builds a [`UniformLayout`] field by field, mirroring the member order of
/// the WGSL block so offsets line up with the shader's own layout.
#[derive(Debug, Default)]
pub struct UniformLayoutBuilder {
    fields: Vec<UniformField>,
    textures: Vec<TextureSlot>,
    cursor: u32,
    next_texture_binding: u32,
}

/// Binding index of the uniform block.
pub const BLOCK_BINDING: u32 = 0;
/// Binding index of the shared sampler.
pub const SAMPLER_BINDING: u32 = 1;
/// First binding index handed out to texture slots.
const FIRST_TEXTURE_BINDING: u32 = 2;

impl UniformLayoutBuilder {
    pub fn new() -> Self {
        Self {
            next_texture_binding: FIRST_TEXTURE_BINDING,
            ..Self::default()
        }
    }

    fn field(&mut self, name: impl Into<String>, kind: FieldKind) -> &mut Self {
        let offset = align_up(self.cursor, kind.align());
        self.fields.push(UniformField {
            name: name.into(),
            kind,
            offset,
        });
        self.cursor = offset + kind.size();
        self
    }

    pub fn float(&mut self, name: impl Into<String>) -> &mut Self {
        self.field(name, FieldKind::Float)
    }

    pub fn vec2(&mut self, name: impl Into<String>) -> &mut Self {
        self.field(name, FieldKind::Vec2)
    }

    pub fn vec3(&mut self, name: impl Into<String>) -> &mut Self {
        self.field(name, FieldKind::Vec3)
    }

    pub fn mat4(&mut self, name: impl Into<String>) -> &mut Self {
        self.field(name, FieldKind::Mat4)
    }

    pub fn flag(&mut self, name: impl Into<String>) -> &mut Self {
        self.field(name, FieldKind::Bool)
    }

    /// Emits the fields of one array-of-struct element; elements start and
    /// end on 16-byte boundaries so the stride matches WGSL.
    pub fn element(&mut self, f: impl FnOnce(&mut Self)) -> &mut Self {
        self.cursor = align_up(self.cursor, 16);
        f(self);
        self.cursor = align_up(self.cursor, 16);
        self
    }

    /// Declares a sampled texture slot; bindings are handed out in call
    /// order starting after the block and sampler.
    pub fn texture(&mut self, name: impl Into<String>) -> &mut Self {
        self.textures.push(TextureSlot {
            name: name.into(),
            binding: self.next_texture_binding,
        });
        self.next_texture_binding += 1;
        self
    }

    pub fn build(&mut self) -> UniformLayout {
        UniformLayout {
            fields: std::mem::take(&mut self.fields),
            textures: std::mem::take(&mut self.textures),
            block_size: align_up(self.cursor, 16),
        }
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Packs a [`UniformSet`] against one program's declared layout.
pub struct UniformBinder<'a> {
    layout: &'a UniformLayout,
    program: &'a str,
}

impl<'a> UniformBinder<'a> {
    pub fn new(layout: &'a UniformLayout, program: &'a str) -> Self {
        Self { layout, program }
    }

    fn lookup(&self, set: &'a UniformSet, name: &str) -> Result<&'a UniformValue, RenderError> {
        set.get(name).ok_or_else(|| RenderError::MissingUniform {
            program: self.program.to_string(),
            name: name.to_string(),
        })
    }

    /// Packs the block fields into bytes ready for a uniform buffer upload.
    pub fn pack(&self, set: &UniformSet) -> Result<Vec<u8>, RenderError> {
        let mut bytes = vec![0u8; self.layout.block_size as usize];
        for field in &self.layout.fields {
            let value = self.lookup(set, &field.name)?;
            let offset = field.offset as usize;
            let mismatch = || RenderError::UniformType {
                name: field.name.clone(),
                expected: field.kind.expected(),
            };
            match (field.kind, value) {
                (FieldKind::Float, UniformValue::Float(v)) => {
                    bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
                }
                (FieldKind::Vec2, UniformValue::Vec2(v)) => {
                    bytes[offset..offset + 8].copy_from_slice(bytemuck::cast_slice(&v.to_array()));
                }
                (FieldKind::Vec3, UniformValue::Vec3(v)) => {
                    bytes[offset..offset + 12].copy_from_slice(bytemuck::cast_slice(&v.to_array()));
                }
                (FieldKind::Mat4, UniformValue::Mat4(v)) => {
                    bytes[offset..offset + 64]
                        .copy_from_slice(bytemuck::cast_slice(&v.to_cols_array()));
                }
                (FieldKind::Bool, UniformValue::Bool(v)) => {
                    bytes[offset..offset + 4].copy_from_slice(&(*v as u32).to_le_bytes());
                }
                _ => return Err(mismatch()),
            }
        }
        Ok(bytes)
    }

    /// Resolves every declared texture slot to its handle, in binding order.
    pub fn textures(&self, set: &UniformSet) -> Result<Vec<(u32, TextureHandle)>, RenderError> {
        let mut resolved = Vec::with_capacity(self.layout.textures.len());
        for slot in &self.layout.textures {
            match self.lookup(set, &slot.name)? {
                UniformValue::Texture(handle) => resolved.push((slot.binding, *handle)),
                _ => {
                    return Err(RenderError::UniformType {
                        name: slot.name.clone(),
                        expected: "texture",
                    })
                }
            }
        }
        Ok(resolved)
    }
}
