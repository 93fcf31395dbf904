use fancy_record::{
    ConversionError, JsonBase, JsonRecord, Mapping, Record, Union, Value, from_value, to_value,
};
use pretty_assertions::assert_eq;

fn mapping(pairs: &[(&str, Value)]) -> Mapping {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(extends(JsonBase))]
struct Circle {
    radius: f64,
}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(extends(JsonBase))]
struct Square {
    side: f64,
}

#[derive(Debug, Clone, PartialEq, Union)]
enum Shape {
    Circle(Circle),
    Square(Square),
}

#[derive(Debug, PartialEq, Record)]
struct Drawing {
    shapes: Vec<Shape>,
    focus: Option<Shape>,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Dot {
    x: i64,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Segment {
    x: i64,
    len: i64,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Pin {
    x: i64,
    #[record(default)]
    label: String,
}

#[derive(Debug, PartialEq, Union)]
enum Mark {
    Dot(Dot),
    Segment(Segment),
}

#[derive(Debug, PartialEq, Union)]
enum Marker {
    Dot(Dot),
    Pin(Pin),
}

#[derive(Debug, PartialEq, Union)]
enum OnlyDot {
    Dot(Dot),
}

#[test]
fn tagged_variant_is_chosen_by_type_key() {
    let input = Value::Map(mapping(&[
        ("type", Value::from("Circle")),
        ("radius", Value::Int(3)),
    ]));
    let shape: Shape = from_value(&input).unwrap();
    assert_eq!(shape, Shape::Circle(Circle { radius: 3.0 }));
}

#[test]
fn qualified_tags_are_written_and_read_back() {
    let drawing = Drawing {
        shapes: vec![
            Shape::Square(Square { side: 2.0 }),
            Shape::Circle(Circle { radius: 1.5 }),
        ],
        focus: None,
    };
    let encoded = drawing.to_mapping().unwrap();
    let shapes = encoded["shapes"].as_list().unwrap();
    let tag = shapes[0].as_map().unwrap()["type"].as_str().unwrap();
    assert_eq!(tag, Square::schema().unwrap().qualname);
    assert!(tag.ends_with("::Square"));

    let text = drawing.to_json_string().unwrap();
    assert_eq!(Drawing::from_json_str(&text).unwrap(), drawing);
}

#[test]
fn unknown_tag_is_reported_at_the_type_key() {
    let input = mapping(&[
        (
            "shapes",
            Value::List(vec![Value::Map(mapping(&[("type", Value::from("Hexagon"))]))]),
        ),
        ("focus", Value::Null),
    ]);
    let err = Drawing::from_mapping(&input).unwrap_err();
    assert_eq!(err.path(), ["shapes", "0", "type"]);
    assert_eq!(
        err.to_string(),
        "expected one of Circle, Square, found type `Hexagon` at shapes.0.type"
    );
}

#[test]
fn untagged_value_picks_the_only_fitting_variant() {
    let short: Mark = from_value(&Value::Map(mapping(&[("x", Value::Int(1))]))).unwrap();
    assert_eq!(short, Mark::Dot(Dot { x: 1 }));

    let long: Mark = from_value(&Value::Map(mapping(&[
        ("x", Value::Int(1)),
        ("len", Value::Int(4)),
    ])))
    .unwrap();
    assert_eq!(long, Mark::Segment(Segment { x: 1, len: 4 }));
}

#[test]
fn untagged_value_fitting_several_variants_is_ambiguous() {
    let err = from_value::<Marker>(&Value::Map(mapping(&[("x", Value::Int(1))]))).unwrap_err();
    assert_eq!(
        err,
        ConversionError::AmbiguousType {
            path: Vec::new(),
            candidates: vec!["Dot".to_string(), "Pin".to_string()],
        }
    );
}

#[test]
fn value_fitting_no_variant_is_a_mismatch() {
    let err = from_value::<Mark>(&Value::Map(mapping(&[("y", Value::Int(1))]))).unwrap_err();
    assert!(matches!(err, ConversionError::TypeMismatch { .. }), "{err}");
    let err = from_value::<Mark>(&Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "expected one of Dot, Segment, found int at <root>");
}

#[test]
fn single_variant_union_behaves_like_its_record() {
    let value = to_value(&OnlyDot::Dot(Dot { x: 2 })).unwrap();
    assert_eq!(value, Value::Map(mapping(&[("x", Value::Int(2))])));
    let back: OnlyDot = from_value(&value).unwrap();
    assert_eq!(back, OnlyDot::Dot(Dot { x: 2 }));
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Stroke {
    color: String,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Brush {
    width: i64,
    stroke: Stroke,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Pen {
    width: i64,
    tip: String,
}

#[derive(Debug, PartialEq, Union)]
enum Tool {
    Brush(Brush),
    Pen(Pen),
}

#[test]
fn nested_records_keep_their_own_extra_key_policy() {
    let stroke = mapping(&[("color", Value::from("red")), ("note", Value::from("x"))]);
    let brush = mapping(&[("width", Value::Int(2)), ("stroke", Value::Map(stroke))]);
    let expected = Brush {
        width: 2,
        stroke: Stroke {
            color: "red".to_string(),
        },
    };

    assert_eq!(Brush::from_mapping(&brush).unwrap(), expected);
    assert_eq!(
        from_value::<Tool>(&Value::Map(brush)).unwrap(),
        Tool::Brush(expected)
    );
}

#[test]
fn extra_keys_on_the_variant_itself_still_disqualify_it() {
    let input = Value::Map(mapping(&[
        ("width", Value::Int(2)),
        ("stroke", Value::Map(mapping(&[("color", Value::from("red"))]))),
        ("tip", Value::from("fine")),
        ("layer", Value::Int(1)),
    ]));
    match from_value::<Tool>(&input).unwrap_err() {
        ConversionError::TypeMismatch { found, .. } => {
            assert_eq!(found, "map matching no variant")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Memo {
    #[record(alias = "type")]
    kind: String,
    text: String,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Tick {
    at: i64,
}

#[derive(Debug, PartialEq, Union)]
enum Entry {
    Memo(Memo),
    Tick(Tick),
}

#[test]
fn a_type_field_is_data_not_a_variant_tag() {
    let memo = mapping(&[("type", Value::from("memo")), ("text", Value::from("hi"))]);
    assert_eq!(
        from_value::<Entry>(&Value::Map(memo)).unwrap(),
        Entry::Memo(Memo {
            kind: "memo".to_string(),
            text: "hi".to_string(),
        })
    );

    let tick = mapping(&[("type", Value::from("Tick")), ("at", Value::Int(3))]);
    assert_eq!(
        from_value::<Entry>(&Value::Map(tick)).unwrap(),
        Entry::Tick(Tick { at: 3 })
    );
}
