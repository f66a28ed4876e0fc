use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use kamaboko::{Error, HostRegistry, Trap, Value, VirtualMachine, VmConfig};

const HEADER: &[u8] = b"\0asm\x01\0\0\0";

fn section(id: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![id, body.len() as u8];
    out.extend_from_slice(body);
    out
}

fn module(sections: &[Vec<u8>]) -> Vec<u8> {
    let mut out = HEADER.to_vec();
    for s in sections {
        out.extend(s);
    }
    out
}

fn add_module() -> Vec<u8> {
    module(&[
        section(0x01, &[0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f]),
        section(0x03, &[0x01, 0x00]),
        section(0x07, &[0x01, 0x03, b'a', b'd', b'd', 0x00, 0x00]),
        section(
            0x0a,
            &[0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b],
        ),
    ])
}

/// Imports `env.double : i32 -> i32` as function 0 and exports `run`, which
/// calls it on its argument and adds one.
fn import_module(import_module: &str) -> Vec<u8> {
    let mut import = vec![0x01, import_module.len() as u8];
    import.extend_from_slice(import_module.as_bytes());
    import.extend_from_slice(&[0x06, b'd', b'o', b'u', b'b', b'l', b'e', 0x00, 0x00]);
    module(&[
        section(0x01, &[0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f]),
        section(0x02, &import),
        section(0x03, &[0x01, 0x00]),
        section(0x07, &[0x01, 0x03, b'r', b'u', b'n', 0x00, 0x01]),
        section(
            0x0a,
            &[0x01, 0x09, 0x00, 0x20, 0x00, 0x10, 0x00, 0x41, 0x01, 0x6a, 0x0b],
        ),
    ])
}

fn double(vm: &mut VirtualMachine<'_>) -> i32 {
    match vm.pop() {
        Ok(Value::Int32(v)) => match vm.push(v.wrapping_mul(2)) {
            Ok(()) => 0,
            Err(_) => 2,
        },
        _ => 1,
    }
}

#[test_log::test]
fn adds_two_numbers() -> anyhow::Result<()> {
    let bytes = add_module();
    let mut vm = VirtualMachine::instantiate(&bytes)?;
    assert_eq!(
        vec![Value::Int32(5)],
        vm.call("add", &[Value::Int32(2), Value::Int32(3)])?
    );
    assert!(!vm.is_trapped());
    assert_eq!(
        vec![Value::Int32(0)],
        vm.call("add", &[Value::Int32(u32::MAX), Value::Int32(1)])?
    );
    Ok(())
}

#[test_log::test]
fn calls_host_function() -> anyhow::Result<()> {
    let bytes = import_module("env");
    let mut registry = HostRegistry::new();
    registry.declare_module("env").register("env", "double", double)?;
    let mut vm = VirtualMachine::instantiate_with(&bytes, VmConfig::default(), registry)?;
    assert_eq!(vec![Value::Int32(15)], vm.call("run", &[Value::Int32(7)])?);

    // the import itself is function 0
    assert_eq!(vec![Value::Int32(8)], vm.call(0u32, &[Value::Int32(4)])?);
    Ok(())
}

#[test_log::test]
fn host_registered_after_instantiation() -> anyhow::Result<()> {
    let bytes = import_module("env");
    let mut vm = VirtualMachine::instantiate(&bytes)?;
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    vm.registry_mut()
        .declare_module("env")
        .register("env", "double", move |vm| {
            counter.fetch_add(1, Ordering::Relaxed);
            double(vm)
        })?;
    assert_eq!(vec![Value::Int32(3)], vm.call("run", &[Value::Int32(1)])?);
    assert_eq!(1, calls.load(Ordering::Relaxed));
    Ok(())
}

#[test_log::test]
fn unknown_import_module() -> anyhow::Result<()> {
    let bytes = import_module("wasi");
    let mut registry = HostRegistry::new();
    registry.declare_module("env").register("env", "double", double)?;
    let mut vm = VirtualMachine::instantiate_with(&bytes, VmConfig::default(), registry)?;
    assert_eq!(
        Err(Error::Trap(Trap::ModuleNotFound)),
        vm.call("run", &[Value::Int32(1)])
    );
    assert!(vm.is_trapped());
    assert_eq!(Err(Error::Trapped), vm.call("run", &[Value::Int32(1)]));
    Ok(())
}

#[test_log::test]
fn unknown_import_function() -> anyhow::Result<()> {
    let bytes = import_module("env");
    let mut registry = HostRegistry::new();
    registry.declare_module("env").register("env", "triple", double)?;
    let mut vm = VirtualMachine::instantiate_with(&bytes, VmConfig::default(), registry)?;
    assert_eq!(
        Err(Error::Trap(Trap::FunctionNotFound)),
        vm.call("run", &[Value::Int32(1)])
    );
    Ok(())
}

#[test_log::test]
fn failing_host_function_traps() -> anyhow::Result<()> {
    let bytes = import_module("env");
    let mut registry = HostRegistry::new();
    registry.declare_module("env").register("env", "double", |_| -3)?;
    let mut vm = VirtualMachine::instantiate_with(&bytes, VmConfig::default(), registry)?;
    assert_eq!(
        Err(Error::Trap(Trap::HostFailure(-3))),
        vm.call("run", &[Value::Int32(1)])
    );
    Ok(())
}

#[test_log::test]
fn data_segment_and_loads() -> anyhow::Result<()> {
    // (memory 1) (data (i32.const 4) "\2a\00\00\00\ff")
    // (func (export "get") (param i32) (result i32) local.get 0 i32.load offset=4)
    // (func (export "byte") (result i32) i32.const 8 i32.load8_u)
    let bytes = module(&[
        section(0x01, &[0x02, 0x60, 0x01, 0x7f, 0x01, 0x7f, 0x60, 0x00, 0x01, 0x7f]),
        section(0x03, &[0x02, 0x00, 0x01]),
        section(0x05, &[0x01, 0x00, 0x01]),
        section(
            0x07,
            &[
                0x02, 0x03, b'g', b'e', b't', 0x00, 0x00, 0x04, b'b', b'y', b't', b'e', 0x00,
                0x01,
            ],
        ),
        section(
            0x0a,
            &[
                0x02, //
                0x07, 0x00, 0x20, 0x00, 0x28, 0x02, 0x04, 0x0b, //
                0x07, 0x00, 0x41, 0x08, 0x2d, 0x00, 0x00, 0x0b,
            ],
        ),
        section(
            0x0b,
            &[0x01, 0x00, 0x41, 0x04, 0x0b, 0x05, 0x2a, 0x00, 0x00, 0x00, 0xff],
        ),
    ]);
    let mut vm = VirtualMachine::instantiate(&bytes)?;
    assert_eq!(vec![Value::Int32(42)], vm.call("get", &[Value::Int32(0)])?);
    assert_eq!(vec![Value::Int32(0xff)], vm.call("byte", &[])?);
    assert_eq!(&[0x2au8, 0, 0, 0, 0xff][..], &vm.memory()[4..9]);

    vm.memory_mut()[4] = 7;
    assert_eq!(vec![Value::Int32(7)], vm.call("get", &[Value::Int32(0)])?);
    Ok(())
}

#[test_log::test]
fn oversized_data_segment_fails_instantiation() {
    let bytes = module(&[
        section(0x05, &[0x01, 0x00, 0x00]),
        section(0x0b, &[0x01, 0x00, 0x41, 0x00, 0x0b, 0x01, 0xaa]),
    ]);
    assert_eq!(
        Err(kamaboko::LinkError::DataSegmentOutOfBounds(0)),
        VirtualMachine::instantiate(&bytes).map(|_| ()).map_err(|err| match err {
            Error::Link(err) => err,
            err => panic!("unexpected error {err}"),
        })
    );
}

#[test_log::test]
fn declared_memory_above_limit_fails_instantiation() -> anyhow::Result<()> {
    let bytes = module(&[section(0x05, &[0x01, 0x00, 0x0a])]);
    let config = VmConfig {
        max_memory_pages: 4,
        ..VmConfig::default()
    };
    assert!(matches!(
        VirtualMachine::instantiate_with(&bytes, config, HostRegistry::new()),
        Err(Error::Link(kamaboko::LinkError::MemoryLimit(10)))
    ));
    let vm = VirtualMachine::instantiate_with(
        &bytes,
        VmConfig {
            max_memory_pages: 10,
            ..config
        },
        HostRegistry::new(),
    )?;
    assert_eq!(10 * 65536, vm.memory().len());
    Ok(())
}

#[test_log::test]
fn extra_arguments_are_rejected() -> anyhow::Result<()> {
    let bytes = add_module();
    let mut vm = VirtualMachine::instantiate(&bytes)?;
    assert_eq!(
        Err(Error::ArgumentCount {
            expected: 2,
            actual: 3
        }),
        vm.call("add", &[Value::Int32(100), Value::Int32(2), Value::Int32(3)])
    );
    assert_eq!(
        vec![Value::Int32(5)],
        vm.call("add", &[Value::Int32(2), Value::Int32(3)])?
    );
    Ok(())
}

#[test_log::test]
fn malformed_modules_are_rejected() {
    assert!(matches!(
        VirtualMachine::instantiate(b"\0asm\x01\0\0"),
        Err(Error::Decode(kamaboko::DecodeError::AbruptStop))
    ));
    let bad_body = module(&[
        section(0x01, &[0x01, 0x60, 0x00, 0x00]),
        section(0x03, &[0x01, 0x00]),
        section(0x0a, &[0x01, 0x03, 0x00, 0x0b, 0x0b]),
    ]);
    assert!(matches!(
        VirtualMachine::instantiate(&bad_body),
        Err(Error::Decode(kamaboko::DecodeError::WrongSize))
    ));
    let bad_type = module(&[
        section(0x01, &[0x01, 0x60, 0x00, 0x00]),
        section(0x03, &[0x01, 0x01]),
        section(0x0a, &[0x01, 0x02, 0x00, 0x0b]),
    ]);
    assert!(matches!(
        VirtualMachine::instantiate(&bad_type),
        Err(Error::Link(kamaboko::LinkError::TypeIndexOutOfBounds(1)))
    ));
}
