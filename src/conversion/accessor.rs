use std::mem;

use anyhow::{anyhow, bail, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use gltf::json::{
    self,
    accessor::{ComponentType, GenericComponentType, Type},
    validation::Checked,
};

/// Reads a float accessor whose elements have `N` components, resolving
/// interleaved views and sparse substitution.
pub fn read_f32<const N: usize>(
    root: &json::Root,
    blob: &[u8],
    index: json::Index<json::Accessor>,
) -> Result<Vec<[f32; N]>> {
    let accessor = get_accessor(root, index)?;
    match accessor.component_type {
        Checked::Valid(GenericComponentType(ComponentType::F32)) => {}
        _ => bail!("Accessor {} does not hold float data", index.value()),
    }
    if dimensions(&accessor.type_) != Some(N) {
        bail!(
            "Accessor {} does not have {} components per element",
            index.value(),
            N
        );
    }

    let count = accessor.count.0 as usize;
    let element_size = N * mem::size_of::<f32>();
    let view = match (accessor.buffer_view, &accessor.sparse) {
        (Some(view), _) => {
            let offset = accessor.byte_offset.map(|o| o.0 as usize).unwrap_or_default();
            let (data, stride) = view_data(root, blob, view, offset)?;
            let stride = stride.unwrap_or(element_size);
            let length = match count.checked_sub(1) {
                Some(last) => last
                    .checked_mul(stride)
                    .and_then(|start| start.checked_add(element_size)),
                None => Some(0),
            };
            if length.map_or(true, |length| length > data.len()) {
                bail!("Accessor {} overruns its view", index.value());
            }
            Some((data, stride))
        }
        // Neither a view nor sparse values: the data lives in an extension,
        // such as mesh compression.
        (None, None) => bail!("Accessor {} has no buffer data", index.value()),
        (None, Some(_)) => None,
    };

    let mut values = vec![[0.; N]; count];
    if let Some((data, stride)) = view {
        for (i, value) in values.iter_mut().enumerate() {
            let mut element = data
                .get(i * stride..i * stride + element_size)
                .ok_or_else(|| anyhow!("Accessor {} overruns its view", index.value()))?;
            for component in value.iter_mut() {
                *component = element.read_f32::<LE>()?;
            }
        }
    }

    if let Some(sparse) = &accessor.sparse {
        let sparse_count = sparse.count.0 as usize;
        let component_type = match sparse.indices.component_type {
            Checked::Valid(json::accessor::IndexComponentType(component_type)) => component_type,
            Checked::Invalid => bail!("Accessor {} has invalid sparse indices", index.value()),
        };
        let (data, _) = view_data(
            root,
            blob,
            sparse.indices.buffer_view,
            sparse.indices.byte_offset.0 as usize,
        )?;
        let targets = read_index_data(data, component_type, sparse_count)?;

        let (mut data, _) = view_data(
            root,
            blob,
            sparse.values.buffer_view,
            sparse.values.byte_offset.0 as usize,
        )?;
        for target in targets {
            let value = values
                .get_mut(target as usize)
                .ok_or_else(|| anyhow!("Sparse index {} is out of range", target))?;
            for component in value.iter_mut() {
                *component = data.read_f32::<LE>()?;
            }
        }
    }

    Ok(values)
}

/// Reads an index accessor of unsigned bytes, shorts or ints.
pub fn read_indices(
    root: &json::Root,
    blob: &[u8],
    index: json::Index<json::Accessor>,
) -> Result<Vec<u32>> {
    let accessor = get_accessor(root, index)?;
    let component_type = match accessor.component_type {
        Checked::Valid(GenericComponentType(component_type)) => component_type,
        Checked::Invalid => bail!("Accessor {} has an invalid component type", index.value()),
    };
    if dimensions(&accessor.type_) != Some(1) || accessor.sparse.is_some() {
        bail!("Accessor {} is not a plain scalar accessor", index.value());
    }

    let view = accessor
        .buffer_view
        .ok_or_else(|| anyhow!("Accessor {} has no buffer view", index.value()))?;
    let offset = accessor.byte_offset.map(|o| o.0 as usize).unwrap_or_default();
    let (data, _) = view_data(root, blob, view, offset)?;

    read_index_data(data, component_type, accessor.count.0 as usize)
}

/// Appends float elements to the buffer and registers a tightly packed view
/// and an accessor for them. Bounds are written when `bounds` is set, as
/// required for vertex positions.
pub fn push_f32<const N: usize>(
    root: &mut json::Root,
    blob: &mut Vec<u8>,
    values: &[[f32; N]],
    type_: Type,
    target: Option<json::buffer::Target>,
    bounds: bool,
) -> Result<json::Index<json::Accessor>> {
    let (min, max): (Option<serde_json::Value>, Option<serde_json::Value>) = if bounds {
        let mut min = [f32::MAX; N];
        let mut max = [f32::MIN; N];
        for value in values {
            for i in 0..N {
                min[i] = min[i].min(value[i]);
                max[i] = max[i].max(value[i]);
            }
        }
        if values.is_empty() {
            (Some(vec![0f32; N].into()), Some(vec![0f32; N].into()))
        } else {
            (Some(min.to_vec().into()), Some(max.to_vec().into()))
        }
    } else {
        (None, None)
    };

    align_to(blob, mem::size_of::<f32>());
    let offset = blob.len();
    for value in values {
        for &component in value {
            blob.write_f32::<LE>(component)?;
        }
    }

    let view = push_view(root, offset, blob.len() - offset, target);
    Ok(root.push(json::Accessor {
        buffer_view: Some(view),
        byte_offset: None,
        count: values.len().into(),
        component_type: Checked::Valid(GenericComponentType(ComponentType::F32)),
        type_: Checked::Valid(type_),
        min,
        max,
        name: None,
        normalized: false,
        sparse: None,
        extensions: None,
        extras: Default::default(),
    }))
}

/// Appends unsigned int indices to the buffer and returns their accessor.
pub fn push_indices(
    root: &mut json::Root,
    blob: &mut Vec<u8>,
    indices: &[u32],
) -> Result<json::Index<json::Accessor>> {
    align_to(blob, mem::size_of::<u32>());
    let offset = blob.len();
    for &index in indices {
        blob.write_u32::<LE>(index)?;
    }

    let view = push_view(
        root,
        offset,
        blob.len() - offset,
        Some(json::buffer::Target::ElementArrayBuffer),
    );
    Ok(root.push(json::Accessor {
        buffer_view: Some(view),
        byte_offset: None,
        count: indices.len().into(),
        component_type: Checked::Valid(GenericComponentType(ComponentType::U32)),
        type_: Checked::Valid(Type::Scalar),
        min: None,
        max: None,
        name: None,
        normalized: false,
        sparse: None,
        extensions: None,
        extras: Default::default(),
    }))
}

/// Adds zeros to the buffer until it is n-byte aligned.
pub fn align_to(buffer: &mut Vec<u8>, n: usize) {
    while buffer.len() % n != 0 {
        buffer.push(0);
    }
}

fn push_view(
    root: &mut json::Root,
    offset: usize,
    length: usize,
    target: Option<json::buffer::Target>,
) -> json::Index<json::buffer::View> {
    root.push(json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: length.into(),
        byte_offset: Some(offset.into()),
        byte_stride: None,
        name: None,
        target: target.map(Checked::Valid),
        extensions: None,
        extras: Default::default(),
    })
}

fn get_accessor(
    root: &json::Root,
    index: json::Index<json::Accessor>,
) -> Result<&json::Accessor> {
    root.accessors
        .get(index.value())
        .ok_or_else(|| anyhow!("Accessor {} does not exist", index.value()))
}

/// Returns the bytes of a buffer view starting at `offset`, along with the
/// view's byte stride.
fn view_data<'a>(
    root: &json::Root,
    blob: &'a [u8],
    index: json::Index<json::buffer::View>,
    offset: usize,
) -> Result<(&'a [u8], Option<usize>)> {
    let view = root
        .buffer_views
        .get(index.value())
        .ok_or_else(|| anyhow!("Buffer view {} does not exist", index.value()))?;
    let start = view.byte_offset.map(|o| o.0 as usize).unwrap_or_default();
    let data = start
        .checked_add(view.byte_length.0 as usize)
        .and_then(|end| blob.get(start..end))
        .and_then(|data| data.get(offset..))
        .ok_or_else(|| anyhow!("Buffer view {} overruns the buffer", index.value()))?;

    Ok((data, view.byte_stride.map(|stride| stride.0)))
}

fn read_index_data(
    mut data: &[u8],
    component_type: ComponentType,
    count: usize,
) -> Result<Vec<u32>> {
    (0..count)
        .map(|_| -> Result<u32> {
            Ok(match component_type {
                ComponentType::U8 => data.read_u8()? as u32,
                ComponentType::U16 => data.read_u16::<LE>()? as u32,
                ComponentType::U32 => data.read_u32::<LE>()?,
                _ => bail!("Indices must be unsigned integers"),
            })
        })
        .collect()
}

fn dimensions(type_: &Checked<Type>) -> Option<usize> {
    match type_ {
        Checked::Valid(Type::Scalar) => Some(1),
        Checked::Valid(Type::Vec2) => Some(2),
        Checked::Valid(Type::Vec3) => Some(3),
        Checked::Valid(Type::Vec4) => Some(4),
        Checked::Valid(Type::Mat2) => Some(4),
        Checked::Valid(Type::Mat3) => Some(9),
        Checked::Valid(Type::Mat4) => Some(16),
        Checked::Invalid => None,
    }
}
