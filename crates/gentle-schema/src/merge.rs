//! Fragment merging for conditional overrides.
//!
//! Scalar rules of the fragment overwrite the base; `items` merge
//! recursively; `properties` merge per key, keeping the base order and
//! appending new keys. A `$ref` on either side is resolved to a concrete
//! descriptor first.

use crate::descriptor::{Descriptor, FieldDescriptor};
use crate::refs::{RefFailure, RefSource};

pub(crate) fn merge(
    base: &Descriptor,
    fragment: &Descriptor,
    refs: &dyn RefSource,
) -> Result<Descriptor, RefFailure> {
    let base = concrete(base, refs)?;
    let fragment = concrete(fragment, refs)?;
    Ok(Descriptor::Field(merge_fields(base, fragment, refs)?))
}

fn concrete(d: &Descriptor, refs: &dyn RefSource) -> Result<FieldDescriptor, RefFailure> {
    match d {
        Descriptor::Field(field) => Ok(field.clone()),
        Descriptor::Ref(name) => refs.descriptor(name),
    }
}

fn merge_fields(
    base: FieldDescriptor,
    frag: FieldDescriptor,
    refs: &dyn RefSource,
) -> Result<FieldDescriptor, RefFailure> {
    let items = match (base.items, frag.items) {
        (Some(b), Some(f)) => Some(Box::new(merge(&b, &f, refs)?)),
        (b, f) => f.or(b),
    };

    let properties = match (base.properties, frag.properties) {
        (Some(mut merged), Some(incoming)) => {
            for (name, f) in incoming {
                match merged.iter_mut().find(|(n, _)| *n == name) {
                    Some(slot) => slot.1 = merge(&slot.1, &f, refs)?,
                    None => merged.push((name, f)),
                }
            }
            Some(merged)
        }
        (b, f) => f.or(b),
    };

    let mut extra = base.extra;
    extra.extend(frag.extra);

    Ok(FieldDescriptor {
        type_spec: frag.type_spec.or(base.type_spec),
        required: frag.required.or(base.required),
        nullable: frag.nullable.or(base.nullable),
        default: frag.default.or(base.default),
        validator: frag.validator.or(base.validator),
        coerce: frag.coerce.or(base.coerce),
        strict_type: frag.strict_type.or(base.strict_type),
        throw: frag.throw.or(base.throw),
        enum_members: frag.enum_members.or(base.enum_members),
        regex: frag.regex.or(base.regex),
        min: frag.min.or(base.min),
        max: frag.max.or(base.max),
        items,
        properties,
        error_message: frag.error_message.or(base.error_message),
        extra,
    })
}
