//! Registration and call-site resolution against custom and default libraries

use std::thread;

use udfkit_ir::{DataType, Expr, TypeAttr, Value};
use udfkit_registry::{
    default_library, native, AnyArg, Lowering, Nullable, RegistryError, Resolver, UdfLibrary,
    Variant, VariantKind,
};

fn t(data_type: DataType) -> TypeAttr {
    TypeAttr::new(data_type)
}

fn n(data_type: DataType) -> TypeAttr {
    TypeAttr::nullable(data_type)
}

#[test]
fn test_unregistered_combination_is_not_found() {
    let library = default_library();
    let err = library.lookup("year", &[t(DataType::Bool)]).unwrap_err();
    assert_eq!(
        err,
        RegistryError::NotFound {
            name: "year".to_string(),
            args: "bool".to_string(),
        }
    );

    let resolver = Resolver::new(library);
    let err = resolver.resolve_types("hour", &[t(DataType::Date)]).unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));

    let err = resolver.resolve_types("no_such_function", &[]).unwrap_err();
    assert_eq!(err.to_string(), "Function not found: no_such_function()");
}

#[test]
fn test_duplicate_signature_is_a_conflict() {
    let mut library = UdfLibrary::new();
    library
        .register_external("twice")
        .args::<(i64,)>(native::unary(|x: i64| x * 2))
        .expect("first registration should succeed");

    let err = library
        .register_external("TWICE")
        .args::<(i64,)>(native::unary(|x: i64| x + x))
        .err()
        .expect("second registration should conflict");
    assert!(matches!(
        err,
        RegistryError::RegistrationConflict { ref name, .. } if name == "twice"
    ));

    // a different nullability is a different signature
    library
        .register_external("twice")
        .args::<(Nullable<i64>,)>(native::unary(|x: i64| x * 2))
        .expect("nullable overload should register");
    assert_eq!(library.find("twice").unwrap().variants.len(), 2);
}

#[test]
fn test_tie_at_best_score_is_ambiguous() {
    let mut library = UdfLibrary::new();
    library
        .register_expr("pick")
        .args::<(AnyArg, i64)>(|_ctx, args| Ok(args[0].clone()))
        .unwrap()
        .args::<(i64, AnyArg)>(|_ctx, args| Ok(args[1].clone()))
        .unwrap();

    let err = library
        .lookup("pick", &[t(DataType::Int64), t(DataType::Int64)])
        .unwrap_err();
    assert!(matches!(err, RegistryError::Ambiguous { .. }));

    // only one candidate for mixed argument types
    let variant = library
        .lookup("pick", &[t(DataType::Varchar), t(DataType::Int64)])
        .unwrap();
    assert_eq!(variant.signature.to_string(), "any, int64");
}

#[test]
fn test_non_null_parameter_rejects_nullable_argument() {
    let mut library = UdfLibrary::new();
    library
        .register_external("strict")
        .args::<(i32,)>(native::unary(|x: i32| x))
        .unwrap();
    library
        .register_external("lenient")
        .args::<(Nullable<i32>,)>(native::unary(|x: i32| x))
        .unwrap();

    assert!(matches!(
        library.lookup("strict", &[n(DataType::Int32)]),
        Err(RegistryError::NotFound { .. })
    ));
    assert!(library.lookup("strict", &[t(DataType::Int32)]).is_ok());
    assert!(library.lookup("lenient", &[n(DataType::Int32)]).is_ok());
    assert!(library.lookup("lenient", &[t(DataType::Int32)]).is_ok());
}

#[test]
fn test_exact_match_beats_nullable_and_any() {
    let mut library = UdfLibrary::new();
    library
        .register_external("f")
        .args::<(i64,)>(native::unary(|x: i64| x))
        .unwrap()
        .args::<(Nullable<i64>,)>(native::unary(|x: i64| x))
        .unwrap();
    library
        .register_expr("f")
        .args::<(AnyArg,)>(|_ctx, args| Ok(args[0].clone()))
        .unwrap();

    let exact = library.lookup("f", &[t(DataType::Int64)]).unwrap();
    assert_eq!(exact.variant.symbol(), Some("f.int64"));
    let nullable = library.lookup("f", &[n(DataType::Int64)]).unwrap();
    assert_eq!(nullable.signature.to_string(), "int64?");
    let any = library.lookup("f", &[t(DataType::Double)]).unwrap();
    assert_eq!(any.variant.kind(), VariantKind::Expr);
}

#[test]
fn test_template_instantiations_get_distinct_symbols() {
    let library = default_library();
    let entry = library.find("minimum").expect("minimum should be registered");
    let symbols: Vec<&str> = entry
        .variants
        .iter()
        .filter_map(|v| v.variant.symbol())
        .collect();
    assert_eq!(
        symbols,
        vec![
            "minimum.int16",
            "minimum.int32",
            "minimum.int64",
            "minimum.float",
            "minimum.double",
            "minimum.timestamp",
            "minimum.date",
        ]
    );
}

#[test]
fn test_aliases_follow_chains() {
    let mut library = UdfLibrary::new();
    library
        .register_external("base")
        .args::<(i64,)>(native::unary(|x: i64| x))
        .unwrap();
    library.register_alias("first", "base").unwrap();
    library.register_alias("second", "first").unwrap();

    assert_eq!(library.canonical_name("SECOND"), "base");
    assert!(library.lookup("second", &[t(DataType::Int64)]).is_ok());
    assert_eq!(library.aliases_of("base"), vec!["first", "second"]);

    assert!(matches!(
        library.register_alias("third", "missing"),
        Err(RegistryError::UnknownAlias { .. })
    ));
    assert!(matches!(
        library.register_alias("base", "first"),
        Err(RegistryError::RegistrationConflict { .. })
    ));
}

#[test]
fn test_resolution_is_idempotent() {
    let library = default_library();
    let resolver = Resolver::new(library);
    let expr = Expr::call(
        "pow",
        vec![
            Expr::arg(0, t(DataType::Int32)),
            Expr::call("sqrt", vec![Expr::arg(1, n(DataType::Int16))]),
        ],
    );

    let once = resolver.resolve_expr(&expr).expect("resolution should succeed");
    let twice = resolver.resolve_expr(&once).expect("re-resolution should succeed");
    assert_eq!(once.fingerprint(), twice.fingerprint());
    assert_eq!(
        resolver.resolve_expr(&expr).unwrap().fingerprint(),
        once.fingerprint()
    );
    // the input tree is left untouched
    assert_eq!(expr.output_attr(), None);
    assert_eq!(
        once.to_string(),
        "pow(CAST($0 AS double), sqrt(CAST($1 AS double)))"
    );
    assert_eq!(once.output_attr(), Some(n(DataType::Double)));
}

#[test]
fn test_self_expanding_macro_is_not_found() {
    let mut library = UdfLibrary::new();
    library
        .register_expr("forever")
        .args::<(AnyArg,)>(|ctx, args| Ok(Expr::call(ctx.func_name(), args.to_vec())))
        .unwrap();
    let resolver = Resolver::new(&library);
    let err = resolver
        .resolve_types("forever", &[t(DataType::Int64)])
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { ref name, .. } if name == "forever"));
}

#[test]
fn test_aggregate_resolution_lowers_to_aggregate() {
    let resolver = Resolver::new(default_library());
    let resolved = resolver
        .resolve_types("avg_cate", &[n(DataType::Double), t(DataType::Varchar)])
        .unwrap();
    assert!(matches!(resolved.lowering, Lowering::Aggregate));
    assert_eq!(resolved.output, t(DataType::Varchar));
    let Variant::Aggregate(def) = &resolved.variant.variant else {
        panic!("avg_cate should resolve to an aggregate");
    };
    assert!(def.is_opaque());
}

#[test]
fn test_catalogue_lists_aliases_and_docs() {
    let docs = default_library().describe();
    let ceil = docs.iter().find(|d| d.name == "ceil").expect("ceil documented");
    assert_eq!(ceil.aliases, vec!["ceiling"]);
    assert!(ceil.doc.is_some());
    assert!(ceil
        .signatures
        .iter()
        .any(|s| s.symbol.as_deref() == Some("ceil.double")));

    let json = serde_json::to_string(&docs).expect("catalogue should serialize");
    assert!(json.contains("\"avg_cate\""));
}

#[test]
fn test_default_library_is_shared_read_only() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let library = default_library();
                let resolver = Resolver::new(library);
                let ty = if i % 2 == 0 { DataType::Int64 } else { DataType::Double };
                resolver
                    .resolve_types("sum", &[t(ty)])
                    .map(|r| r.output)
                    .unwrap()
            })
        })
        .collect();
    let outputs: Vec<TypeAttr> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outputs[0], t(DataType::Int64));
    assert_eq!(outputs[1], t(DataType::Double));
    assert!(std::ptr::eq(default_library(), default_library()));
}

#[test]
fn test_external_native_call() {
    let variant = default_library()
        .lookup("substr", &[t(DataType::Varchar), t(DataType::Int32)])
        .unwrap();
    let Variant::External(def) = &variant.variant else {
        panic!("substring should be external");
    };
    assert_eq!(
        (def.func)(&[Value::from("udfkit"), Value::Int32(-3)]).unwrap(),
        Value::from("kit")
    );
    assert_eq!((def.func)(&[Value::Null, Value::Int32(1)]).unwrap(), Value::Null);
}
