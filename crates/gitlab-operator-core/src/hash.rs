//! Hash helpers for naming resources after the custom resource revision

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::error::{CoreError, Result};

/// `uid-generation`, or empty until the resource has been persisted
///
/// The generation does not move on metadata or status changes, so the hash
/// only changes when the object's `.spec` does.
pub fn simple_object_hash(meta: &ObjectMeta) -> String {
    match (meta.uid.as_deref(), meta.generation) {
        (Some(uid), Some(generation)) if !uid.is_empty() && generation != 0 => {
            format!("{}-{}", uid, generation)
        }
        _ => String::new(),
    }
}

/// Suffix `name` with the last `n` characters of `hash`
///
/// A name that already ends with the suffix is returned unchanged.
pub fn name_with_hash_suffix(name: &str, hash: &str, n: usize) -> Result<String> {
    if n > hash.len() {
        return Err(CoreError::Operation {
            message: format!(
                "desired suffix length of {} is longer than the hash length of {}",
                n,
                hash.len()
            ),
        });
    }

    let suffix = hash.get(hash.len() - n..).ok_or_else(|| CoreError::Operation {
        message: format!("hash {} cannot be split at {}", hash, hash.len() - n),
    })?;

    if name.ends_with(suffix) {
        Ok(name.to_string())
    } else {
        Ok(format!("{}-{}", name, suffix))
    }
}
