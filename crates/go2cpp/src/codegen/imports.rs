//! Hand-written C++ bodies for the host imports.
//!
//! Go's wasm target funnels every host interaction through a small set of
//! `runtime.*` and `syscall/js.*` imports. Each takes the Go stack pointer
//! as its only argument and exchanges values through the frame it points
//! at, exactly as wasm_exec.js does. The bodies here are emitted as
//! `ImportImpl` method bodies bound to the `Go` runtime object.
//!
//! A second table replaces a handful of defined functions (byte-wise
//! memory helpers) with direct calls into `Mem`, bypassing their wasm
//! bodies.

/// The C++ body implementing an import field, or None for an unknown field.
pub fn import_body(field: &str) -> Option<&'static str> {
    let body = match field {
        "runtime.wasmExit" => {
            "\tMem* mem_ = go_->mem();\n\
             \tint32_t code = mem_->LoadInt32(local0_ + 8);\n\
             \tgo_->Exit(code);\n"
        }
        "runtime.wasmWrite" => {
            "\tMem* mem_ = go_->mem();\n\
             \tint64_t fd = mem_->LoadInt64(local0_ + 8);\n\
             \tint64_t ptr = mem_->LoadInt64(local0_ + 16);\n\
             \tint32_t n = mem_->LoadInt32(local0_ + 24);\n\
             \tgo_->Write(fd, static_cast<int32_t>(ptr), n);\n"
        }
        "runtime.resetMemoryDataView" => {
            "\t// Nothing is cached on the C++ side; loads always read through.\n"
        }
        "runtime.nanotime1" => {
            "\tMem* mem_ = go_->mem();\n\
             \tmem_->StoreInt64(local0_ + 8, go_->PreciseNowInNanoseconds());\n"
        }
        "runtime.walltime" | "runtime.walltime1" => {
            "\tMem* mem_ = go_->mem();\n\
             \tdouble msec = go_->UnixNowInMilliseconds();\n\
             \tmem_->StoreInt64(local0_ + 8, static_cast<int64_t>(msec / 1000.0));\n\
             \tmem_->StoreInt32(local0_ + 16, static_cast<int32_t>(std::fmod(msec, 1000.0) * 1000000.0));\n"
        }
        "runtime.scheduleTimeoutEvent" => {
            "\tMem* mem_ = go_->mem();\n\
             \tint64_t interval = mem_->LoadInt64(local0_ + 8);\n\
             \tmem_->StoreInt32(local0_ + 16, go_->ScheduleTimeoutEvent(interval));\n"
        }
        "runtime.clearTimeoutEvent" => {
            "\tMem* mem_ = go_->mem();\n\
             \tgo_->ClearTimeoutEvent(mem_->LoadInt32(local0_ + 8));\n"
        }
        "runtime.getRandomData" => {
            "\tgo_->GetRandomBytes(go_->LoadSlice(local0_ + 8));\n"
        }
        "debug" => {
            "\tstd::cerr << local0_ << std::endl;\n"
        }
        "syscall/js.finalizeRef" => {
            "\tMem* mem_ = go_->mem();\n\
             \tgo_->FinalizeRef(static_cast<int32_t>(mem_->LoadUint32(local0_ + 8)));\n"
        }
        "syscall/js.stringVal" => {
            "\tgo_->StoreValue(local0_ + 24, Value{go_->LoadString(local0_ + 8)});\n"
        }
        "syscall/js.valueGet" => {
            "\tValue result = Value::ReflectGet(go_->LoadValue(local0_ + 8), go_->LoadString(local0_ + 16));\n\
             \tlocal0_ = go_->getsp();\n\
             \tgo_->StoreValue(local0_ + 32, result);\n"
        }
        "syscall/js.valueSet" => {
            "\tValue::ReflectSet(go_->LoadValue(local0_ + 8), go_->LoadString(local0_ + 16), go_->LoadValue(local0_ + 32));\n"
        }
        "syscall/js.valueDelete" => {
            "\tValue::ReflectDelete(go_->LoadValue(local0_ + 8), go_->LoadString(local0_ + 16));\n"
        }
        "syscall/js.valueIndex" => {
            "\tMem* mem_ = go_->mem();\n\
             \tgo_->StoreValue(local0_ + 24, Value::ReflectGetIndex(go_->LoadValue(local0_ + 8), mem_->LoadInt64(local0_ + 16)));\n"
        }
        "syscall/js.valueSetIndex" => {
            "\tMem* mem_ = go_->mem();\n\
             \tValue::ReflectSetIndex(go_->LoadValue(local0_ + 8), mem_->LoadInt64(local0_ + 16), go_->LoadValue(local0_ + 24));\n"
        }
        "syscall/js.valueCall" => {
            "\tMem* mem_ = go_->mem();\n\
             \tValue target = go_->LoadValue(local0_ + 8);\n\
             \tValue method = Value::ReflectGet(target, go_->LoadString(local0_ + 16));\n\
             \tstd::vector<Value> args = go_->LoadSliceOfValues(local0_ + 32);\n\
             \tValue result = Value::ReflectApply(method, target, args);\n\
             \tlocal0_ = go_->getsp();\n\
             \tgo_->StoreValue(local0_ + 56, result);\n\
             \tmem_->StoreInt8(local0_ + 64, 1);\n"
        }
        "syscall/js.valueInvoke" => {
            "\tMem* mem_ = go_->mem();\n\
             \tValue target = go_->LoadValue(local0_ + 8);\n\
             \tstd::vector<Value> args = go_->LoadSliceOfValues(local0_ + 16);\n\
             \tValue result = Value::ReflectApply(target, Value{}, args);\n\
             \tlocal0_ = go_->getsp();\n\
             \tgo_->StoreValue(local0_ + 40, result);\n\
             \tmem_->StoreInt8(local0_ + 48, 1);\n"
        }
        "syscall/js.valueNew" => {
            "\tMem* mem_ = go_->mem();\n\
             \tValue target = go_->LoadValue(local0_ + 8);\n\
             \tstd::vector<Value> args = go_->LoadSliceOfValues(local0_ + 16);\n\
             \tValue result = Value::ReflectConstruct(target, args);\n\
             \tlocal0_ = go_->getsp();\n\
             \tgo_->StoreValue(local0_ + 40, result);\n\
             \tmem_->StoreInt8(local0_ + 48, 1);\n"
        }
        "syscall/js.valueLength" => {
            "\tMem* mem_ = go_->mem();\n\
             \tmem_->StoreInt64(local0_ + 16, go_->LoadValue(local0_ + 8).Length());\n"
        }
        "syscall/js.valuePrepareString" => {
            "\tMem* mem_ = go_->mem();\n\
             \tstd::string str = go_->LoadValue(local0_ + 8).ToString();\n\
             \tgo_->StoreValue(local0_ + 16, Value{str});\n\
             \tmem_->StoreInt64(local0_ + 24, static_cast<int64_t>(str.size()));\n"
        }
        "syscall/js.valueLoadString" => {
            "\tstd::string str = go_->LoadValue(local0_ + 8).ToString();\n\
             \tBytesSegment dst = go_->LoadSlice(local0_ + 16);\n\
             \tstd::copy_n(str.begin(), std::min(str.size(), dst.size()), dst.begin());\n"
        }
        "syscall/js.copyBytesToGo" => {
            "\tMem* mem_ = go_->mem();\n\
             \tBytesSegment dst = go_->LoadSlice(local0_ + 8);\n\
             \tValue src = go_->LoadValue(local0_ + 32);\n\
             \tif (!src.IsBytes()) {\n\
             \t\tmem_->StoreInt8(local0_ + 48, 0);\n\
             \t\treturn;\n\
             \t}\n\
             \tconst std::vector<uint8_t>& bytes = src.ToBytes();\n\
             \tsize_t n = std::min(dst.size(), bytes.size());\n\
             \tstd::copy_n(bytes.begin(), n, dst.begin());\n\
             \tmem_->StoreInt64(local0_ + 40, static_cast<int64_t>(n));\n\
             \tmem_->StoreInt8(local0_ + 48, 1);\n"
        }
        "syscall/js.copyBytesToJS" => {
            "\tMem* mem_ = go_->mem();\n\
             \tValue dst = go_->LoadValue(local0_ + 8);\n\
             \tBytesSegment src = go_->LoadSlice(local0_ + 16);\n\
             \tif (!dst.IsBytes()) {\n\
             \t\tmem_->StoreInt8(local0_ + 48, 0);\n\
             \t\treturn;\n\
             \t}\n\
             \tstd::vector<uint8_t>& bytes = dst.ToBytes();\n\
             \tsize_t n = std::min(bytes.size(), src.size());\n\
             \tstd::copy_n(src.begin(), n, bytes.begin());\n\
             \tmem_->StoreInt64(local0_ + 40, static_cast<int64_t>(n));\n\
             \tmem_->StoreInt8(local0_ + 48, 1);\n"
        }
        _ => return None,
    };
    Some(body)
}

/// Body for an import field outside the table: fail at call time, the way
/// wasm_exec.js does, instead of failing the transpile.
pub fn unimplemented_body(field: &str) -> String {
    format!("\tgo_->Unimplemented(\"{}\");\n", field)
}

/// Replacement bodies for defined functions dispatched by symbol name.
///
/// These are the Go runtime's byte-wise memory helpers; routing them to
/// `Mem` skips their word-at-a-time wasm loops. The frame layouts follow
/// the Go wasm ABI: arguments start at SP+8, each slot is 8 bytes wide,
/// and a zero return tells the scheduler no unwind happened.
pub fn replaced_body(symbol: &str) -> Option<&'static str> {
    let body = match symbol {
        "memcmp" => {
            "\tint32_t sp = global0_;\n\
             \tint32_t a = static_cast<int32_t>(mem_->LoadInt64(sp + 8));\n\
             \tint32_t b = static_cast<int32_t>(mem_->LoadInt64(sp + 16));\n\
             \tint32_t size = static_cast<int32_t>(mem_->LoadInt64(sp + 24));\n\
             \tmem_->StoreInt32(sp + 32, mem_->Memcmp(a, b, size));\n\
             \treturn 0;\n"
        }
        "memeqbody" => {
            "\tint32_t sp = global0_;\n\
             \tint32_t a = static_cast<int32_t>(mem_->LoadInt64(sp + 8));\n\
             \tint32_t b = static_cast<int32_t>(mem_->LoadInt64(sp + 16));\n\
             \tint32_t size = static_cast<int32_t>(mem_->LoadInt64(sp + 24));\n\
             \tmem_->StoreInt8(sp + 32, mem_->Memcmp(a, b, size) == 0 ? 1 : 0);\n\
             \treturn 0;\n"
        }
        "memchr" => {
            "\tint32_t sp = global0_;\n\
             \tint32_t ptr = static_cast<int32_t>(mem_->LoadInt64(sp + 8));\n\
             \tint32_t c = static_cast<int32_t>(mem_->LoadUint8(sp + 16));\n\
             \tint32_t n = static_cast<int32_t>(mem_->LoadInt64(sp + 24));\n\
             \tmem_->StoreInt64(sp + 32, mem_->Memchr(ptr, c, n));\n\
             \treturn 0;\n"
        }
        // wasmMove/wasmZero take wasm parameters directly and work on
        // 8-byte words.
        "runtime.wasmMove" => "\tmem_->Memmove(local0_, local1_, local2_ * 8);\n",
        "runtime.wasmZero" => "\tmem_->Memset(local0_, 0, local1_ * 8);\n",
        _ => return None,
    };
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_family_is_covered() {
        for field in [
            "runtime.wasmExit",
            "runtime.wasmWrite",
            "runtime.resetMemoryDataView",
            "runtime.nanotime1",
            "runtime.walltime",
            "runtime.walltime1",
            "runtime.scheduleTimeoutEvent",
            "runtime.clearTimeoutEvent",
            "runtime.getRandomData",
        ] {
            assert!(import_body(field).is_some(), "missing body for {}", field);
        }
    }

    #[test]
    fn js_family_is_covered() {
        for field in [
            "syscall/js.finalizeRef",
            "syscall/js.stringVal",
            "syscall/js.valueGet",
            "syscall/js.valueSet",
            "syscall/js.valueDelete",
            "syscall/js.valueIndex",
            "syscall/js.valueSetIndex",
            "syscall/js.valueCall",
            "syscall/js.valueInvoke",
            "syscall/js.valueNew",
            "syscall/js.valueLength",
            "syscall/js.valuePrepareString",
            "syscall/js.valueLoadString",
            "syscall/js.copyBytesToGo",
            "syscall/js.copyBytesToJS",
        ] {
            assert!(import_body(field).is_some(), "missing body for {}", field);
        }
    }

    #[test]
    fn unknown_fields_fail_at_call_time() {
        assert!(import_body("gojs.something.new").is_none());
        let body = unimplemented_body("gojs.something.new");
        assert!(body.contains("Unimplemented(\"gojs.something.new\")"));
    }

    #[test]
    fn replaced_symbols_bypass_wasm_bodies() {
        assert!(replaced_body("memcmp").is_some());
        assert!(replaced_body("memeqbody").is_some());
        assert!(replaced_body("memchr").is_some());
        assert!(replaced_body("runtime.wasmMove").is_some());
        assert!(replaced_body("runtime.wasmZero").is_some());
        assert!(replaced_body("main.main").is_none());
    }

    #[test]
    fn reflective_bodies_reread_the_stack_pointer() {
        // Calls into the embedder can resume goroutines and move the Go
        // stack; the frame pointer must be re-read before storing results.
        for field in [
            "syscall/js.valueGet",
            "syscall/js.valueCall",
            "syscall/js.valueInvoke",
            "syscall/js.valueNew",
        ] {
            let body = import_body(field).unwrap();
            assert!(
                body.contains("local0_ = go_->getsp();"),
                "{} must re-read sp",
                field
            );
        }
    }
}
