//! Value-type mapping between Wasm and the generated C++.

use anyhow::{bail, Result};
use wasmparser::{FuncType, ValType};

/// Convert a Wasm value type to its C++ carrier type.
pub fn cpp_type(ty: ValType) -> Result<&'static str> {
    match ty {
        ValType::I32 => Ok("int32_t"),
        ValType::I64 => Ok("int64_t"),
        ValType::F32 => Ok("float"),
        ValType::F64 => Ok("double"),
        _ => bail!("unsupported value type: {:?}", ty),
    }
}

/// Zero literal for a local declaration of the given type.
pub fn zero_literal(ty: ValType) -> &'static str {
    match ty {
        ValType::I32 => "0",
        ValType::I64 => "0",
        ValType::F32 => "0.0f",
        ValType::F64 => "0.0",
        _ => "0",
    }
}

/// The single result type of a signature, or None for void.
///
/// Multi-value signatures cannot be materialised as a C++ return value and
/// fail the run here.
pub fn single_result(ty: &FuncType) -> Result<Option<ValType>> {
    match ty.results() {
        [] => Ok(None),
        [r] => Ok(Some(*r)),
        results => bail!(
            "signatures with {} return values are not supported",
            results.len()
        ),
    }
}

/// C++ return type text for a signature.
pub fn cpp_return_type(ty: &FuncType) -> Result<&'static str> {
    match single_result(ty)? {
        Some(r) => cpp_type(r),
        None => Ok("void"),
    }
}

/// C++ parameter list (`int32_t local0_, double local1_`) for a signature.
pub fn cpp_params(ty: &FuncType) -> Result<String> {
    let mut parts = Vec::with_capacity(ty.params().len());
    for (i, p) in ty.params().iter().enumerate() {
        parts.push(format!("{} local{}_", cpp_type(*p)?, i));
    }
    Ok(parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carrier_types() {
        assert_eq!(cpp_type(ValType::I32).unwrap(), "int32_t");
        assert_eq!(cpp_type(ValType::I64).unwrap(), "int64_t");
        assert_eq!(cpp_type(ValType::F32).unwrap(), "float");
        assert_eq!(cpp_type(ValType::F64).unwrap(), "double");
    }

    #[test]
    fn multi_result_signature_is_rejected() {
        let ty = FuncType::new([ValType::I32], [ValType::I32, ValType::I32]);
        assert!(single_result(&ty).is_err());
    }

    #[test]
    fn param_list_uses_local_names() {
        let ty = FuncType::new([ValType::I32, ValType::F64], []);
        assert_eq!(cpp_params(&ty).unwrap(), "int32_t local0_, double local1_");
        assert_eq!(cpp_return_type(&ty).unwrap(), "void");
    }
}
