//! Property tests for the text codec and sparse slot storage.
//!
//! Any value that conforms to its field must survive export followed by
//! import unchanged, whatever characters its strings contain.

use proptest::prelude::*;
use proptree_reflect::prelude::*;
use proptree_reflect::text::NoObjects;

struct Fixture {
    schema: Schema,
    record: FieldId,
}

fn fixture() -> Fixture {
    let mut b = SchemaBuilder::new();
    let mood = b.add_enum("Mood", &[("Calm", 0), ("Busy", 3), ("Away", 9)]);
    let record = b
        .structure("Record")
        .field("Flag", FieldSpec::Bool)
        .field("Count", FieldSpec::Int)
        .field("Ratio", FieldSpec::Float)
        .field("Label", FieldSpec::Str)
        .field("Mood", FieldSpec::Enum(mood))
        .field("History", FieldSpec::array(FieldSpec::Int))
        .field("Tags", FieldSpec::set(FieldSpec::Str))
        .field("Weights", FieldSpec::map(FieldSpec::Name, FieldSpec::Float))
        .field("Corners", FieldSpec::Int)
        .arity(2)
        .finish()
        .unwrap();
    let holder = b
        .object("Holder", None)
        .field("Record", FieldSpec::Struct(record))
        .finish()
        .unwrap();
    let (schema, _) = b.build();
    let record = schema.find_field(holder, "Record").unwrap();
    Fixture { schema, record }
}

/// Finite floats over a wide magnitude range.
fn finite_f64() -> impl Strategy<Value = f64> {
    prop_oneof![
        proptest::num::f64::NORMAL,
        (-1_000_000i64..1_000_000i64).prop_map(|v| v as f64 * 0.001),
        Just(0.0),
    ]
}

fn record_strategy() -> impl Strategy<Value = Value> {
    (
        any::<bool>(),
        any::<i64>(),
        finite_f64(),
        ".*",
        prop_oneof![prop::sample::select(vec![0i64, 3, 9]), any::<i64>()],
        prop::collection::vec(any::<i64>(), 0..6),
        prop::collection::hash_set(".{0,8}", 0..4),
        prop::collection::btree_map("[a-zA-Z_][a-zA-Z0-9_]{0,6}", finite_f64(), 0..4),
        (any::<i64>(), any::<i64>()),
    )
        .prop_map(
            |(flag, count, ratio, label, mood, history, tags, weights, (c0, c1))| {
                Value::Struct(vec![
                    Value::Bool(flag),
                    Value::Int(count),
                    Value::Float(ratio),
                    Value::Str(label),
                    Value::Enum(mood),
                    Value::Array(history.into_iter().map(Value::Int).collect()),
                    Value::Set(tags.into_iter().map(Value::Str).collect()),
                    Value::Map(
                        weights
                            .into_iter()
                            .map(|(k, v)| (Value::Name(k), Value::Float(v)))
                            .collect(),
                    ),
                    Value::Fixed(vec![Value::Int(c0), Value::Int(c1)]),
                ])
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn export_then_import_is_identity(value in record_strategy()) {
        let fx = fixture();
        prop_assert!(fx.schema.conforms(fx.record, &value));

        let codec = TextCodec::new(&fx.schema, &NoObjects);
        let text = codec.export(fx.record, &value);
        let back = codec.import(fx.record, &text);
        prop_assert_eq!(back, Ok(value));
    }

    #[test]
    fn logical_indices_track_live_elements(
        values in prop::collection::vec(any::<u16>(), 1..20),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
    ) {
        let mut slots: SparseSlots<u16> = values.iter().copied().collect();
        for removal in removals {
            if slots.is_empty() {
                break;
            }
            let logical = removal.index(slots.len());
            let internal = slots.logical_to_internal(logical).unwrap();
            prop_assert_eq!(slots.internal_to_logical(internal), Some(logical));
            slots.remove(internal);
        }
        let live: Vec<u16> = slots.iter().copied().collect();
        for (logical, expected) in live.iter().enumerate() {
            let internal = slots.logical_to_internal(logical).unwrap();
            prop_assert_eq!(slots.get(internal), Some(expected));
        }
        prop_assert_eq!(slots.logical_to_internal(live.len()), None);
    }
}
