use minirpc::CodecType;
use minirpc_service::{MethodError, Service, ServiceError, ServiceRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
struct Args {
    num1: i64,
    num2: i64,
}

struct Arith;

impl Arith {
    fn sum(&self, args: Args, reply: &mut i64) -> Result<(), MethodError> {
        *reply = args.num1 + args.num2;
        Ok(())
    }

    fn fail(&self, _args: Args, _reply: &mut i64) -> Result<(), MethodError> {
        Err("some error".into())
    }
}

struct Store;

fn arith_service() -> Service {
    Service::new(Arith)
        .method("Sum", Arith::sum)
        .method("Fail", Arith::fail)
        .method("hidden", Arith::sum)
        .build()
}

fn invoke(
    registry: &ServiceRegistry,
    service_method: &str,
    body: &[u8],
) -> Result<Vec<u8>, ServiceError> {
    let (service, mtype) = registry.find_service(service_method)?;
    let mut invocation = mtype.new_invocation();
    invocation
        .argv()
        .decode_body(CodecType::Json, body)
        .expect("argument should decode");
    let reply = service.call(&mtype, invocation)?;
    Ok(reply.encode_body(CodecType::Json).expect("reply should encode"))
}

#[test]
fn test_register_and_resolve() {
    let registry = ServiceRegistry::new();
    registry.register(arith_service()).unwrap();

    let (service, mtype) = registry.find_service("Arith.Sum").unwrap();
    assert_eq!(service.name(), "Arith");
    assert_eq!(mtype.name(), "Sum");
    assert!(mtype.arg_type().ends_with("Args"));
    assert_eq!(mtype.reply_type(), "i64");
}

#[test]
fn test_unexported_methods_are_skipped() {
    let registry = ServiceRegistry::new();
    registry.register(arith_service()).unwrap();

    let err = registry.find_service("Arith.hidden").unwrap_err();
    assert_eq!(err, ServiceError::MethodNotFound("hidden".into()));
}

#[test]
fn test_duplicate_registration_keeps_first() {
    let registry = ServiceRegistry::new();
    registry.register(arith_service()).unwrap();

    let impostor = Service::with_name("Arith", Store).method(
        "Sum",
        |_: &Store, _: Args, reply: &mut i64| -> Result<(), MethodError> {
            *reply = -1;
            Ok(())
        },
    );
    let err = registry.register(impostor).unwrap_err();
    assert_eq!(err, ServiceError::DuplicateService("Arith".into()));
    assert_eq!(err.to_string(), "rpc: service already defined: Arith");

    let reply = invoke(&registry, "Arith.Sum", br#"{"num1":3,"num2":4}"#).unwrap();
    assert_eq!(reply, b"7");
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_invalid_service_name_is_rejected() {
    let registry = ServiceRegistry::new();
    let err = registry
        .register(Service::with_name("arith", Arith).method("Sum", Arith::sum))
        .unwrap_err();
    assert_eq!(err, ServiceError::InvalidServiceName("arith".into()));
    assert!(registry.is_empty());
}

#[test]
fn test_resolution_errors_are_distinct() {
    let registry = ServiceRegistry::new();
    registry.register(arith_service()).unwrap();

    let err = registry.find_service("ArithSum").unwrap_err();
    assert_eq!(
        err.to_string(),
        "rpc server: service/method request ill-formed: ArithSum"
    );

    let err = registry.find_service("Nope.Sum").unwrap_err();
    assert_eq!(err.to_string(), "rpc server: can't find service Nope");

    let err = registry.find_service("Arith.Nope").unwrap_err();
    assert_eq!(err.to_string(), "rpc server: can't find method Nope");
}

#[test]
fn test_last_dot_separates_service_from_method() {
    let registry = ServiceRegistry::new();
    registry
        .register(Service::with_name("Math.Arith", Arith).method("Sum", Arith::sum))
        .unwrap();

    let (service, mtype) = registry.find_service("Math.Arith.Sum").unwrap();
    assert_eq!(service.name(), "Math.Arith");
    assert_eq!(mtype.name(), "Sum");
}

#[test]
fn test_num_calls_counts_every_invocation() {
    let registry = ServiceRegistry::new();
    registry.register(arith_service()).unwrap();

    for _ in 0..3 {
        invoke(&registry, "Arith.Sum", br#"{"num1":1,"num2":1}"#).unwrap();
    }
    let err = invoke(&registry, "Arith.Fail", br#"{"num1":1,"num2":1}"#).unwrap_err();
    assert_eq!(err, ServiceError::Method("some error".into()));
    assert_eq!(err.to_string(), "some error");

    let (_, sum) = registry.find_service("Arith.Sum").unwrap();
    let (_, fail) = registry.find_service("Arith.Fail").unwrap();
    assert_eq!(sum.num_calls(), 3);
    assert_eq!(fail.num_calls(), 1);
}

#[test]
fn test_container_replies_start_empty() {
    let registry = ServiceRegistry::new();
    registry
        .register(
            Service::new(Store)
                .method(
                    "Keys",
                    |_: &Store, _: (), _reply: &mut HashMap<String, i64>| -> Result<(), MethodError> {
                        Ok(())
                    },
                )
                .method(
                    "Values",
                    |_: &Store, _: (), _reply: &mut Vec<i64>| -> Result<(), MethodError> { Ok(()) },
                ),
        )
        .unwrap();

    assert_eq!(invoke(&registry, "Store.Keys", b"null").unwrap(), b"{}");
    assert_eq!(invoke(&registry, "Store.Values", b"null").unwrap(), b"[]");
}

#[test]
fn test_each_invocation_gets_fresh_values() {
    let registry = ServiceRegistry::new();
    registry
        .register(Service::new(Store).method(
            "Push",
            |_: &Store, value: i64, reply: &mut Vec<i64>| -> Result<(), MethodError> {
                reply.push(value);
                Ok(())
            },
        ))
        .unwrap();

    assert_eq!(invoke(&registry, "Store.Push", b"1").unwrap(), b"[1]");
    assert_eq!(invoke(&registry, "Store.Push", b"2").unwrap(), b"[2]");
}

#[test]
fn test_invoking_without_argument_fails() {
    let registry = ServiceRegistry::new();
    registry.register(arith_service()).unwrap();

    let (service, mtype) = registry.find_service("Arith.Sum").unwrap();
    let err = service
        .call(&mtype, mtype.new_invocation())
        .err()
        .expect("call should fail");
    assert_eq!(err, ServiceError::MissingArgument("Sum".into()));
    assert_eq!(mtype.num_calls(), 1);
}
