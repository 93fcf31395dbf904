use fancy_record::{
    ConversionError, DecodeOptions, DefinitionError, Error, JsonRecord, Mapping, Record, Value,
};
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq, Record)]
struct Address {
    street: String,
    #[record(default)]
    city: String,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Customer {
    name: String,
    #[record(flatten)]
    address: Address,
}

#[derive(Debug, PartialEq, Record)]
#[record(flatten = true)]
struct Order {
    id: i64,
    customer: Customer,
}

#[derive(Debug, PartialEq, Record)]
struct Overlapping {
    street: String,
    #[record(flatten)]
    address: Address,
}

#[derive(Debug, PartialEq, Record)]
struct FlatList {
    #[record(flatten)]
    tags: Vec<String>,
}

#[derive(Debug, PartialEq, Record)]
struct Point {
    x: i64,
    y: i64,
}

fn customer() -> Customer {
    Customer {
        name: "Ann".to_string(),
        address: Address {
            street: "Main".to_string(),
            city: String::new(),
        },
    }
}

#[test]
fn flattened_fields_share_the_parent_mapping() {
    let encoded = customer().to_mapping().unwrap();
    let expected: Mapping = [
        ("name".to_string(), Value::from("Ann")),
        ("street".to_string(), Value::from("Main")),
    ]
    .into_iter()
    .collect();
    assert_eq!(encoded, expected);
    assert_eq!(Customer::from_mapping(&encoded).unwrap(), customer());
    assert_eq!(
        Customer::schema().unwrap().keys(),
        ["name".to_string(), "street".to_string(), "city".to_string()]
    );
}

#[test]
fn class_flatten_applies_to_every_record_field() {
    let order = Order {
        id: 7,
        customer: customer(),
    };
    let text = order.to_json_string().unwrap();
    assert_eq!(text, r#"{"id":7,"name":"Ann","street":"Main"}"#);
    assert_eq!(Order::from_json_str(&text).unwrap(), order);
}

#[test]
fn strict_decoding_sees_through_flattened_fields() {
    let mut input = customer().to_mapping().unwrap();
    input.insert("zip".to_string(), Value::from("12345"));
    let err = Customer::from_mapping_with(&input, DecodeOptions::strict()).unwrap_err();
    assert_eq!(
        err,
        ConversionError::UnknownKey {
            path: Vec::new(),
            record: "Customer".to_string(),
            keys: vec!["zip".to_string()],
        }
    );
}

#[test]
fn flattened_keys_must_not_collide() {
    assert_eq!(
        Overlapping::schema().unwrap_err(),
        DefinitionError::DuplicateKey {
            record: "Overlapping".to_string(),
            key: "street".to_string(),
        }
    );
}

#[test]
fn only_records_can_be_flattened() {
    let err = FlatList::schema().unwrap_err();
    assert!(
        matches!(&err, DefinitionError::Flatten { field, .. } if field == "tags"),
        "{err}"
    );
}

#[test]
fn pretty_output_is_indented() {
    let text = Point { x: 1, y: -2 }.to_json_string_pretty().unwrap();
    assert_eq!(text, "{\n  \"x\": 1,\n  \"y\": -2\n}");
}

#[test]
fn writer_and_reader_round_trip() {
    let mut buffer = Vec::new();
    Point { x: 3, y: 4 }.to_json_writer(&mut buffer).unwrap();
    let back = Point::from_json_reader(buffer.as_slice()).unwrap();
    assert_eq!(back, Point { x: 3, y: 4 });
}

#[test]
fn top_level_must_be_an_object() {
    let err = Point::from_json_str("[1, 2]").unwrap_err();
    match err {
        Error::Conversion(err) => {
            assert_eq!(err.to_string(), "expected JSON object, found list at <root>");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_text_is_a_json_error() {
    assert!(matches!(Point::from_json_str("{\"x\": "), Err(Error::Json(_))));
}

#[test]
fn json_values_convert_without_text() {
    let value = Point { x: 1, y: 2 }.to_json_value().unwrap();
    assert_eq!(value, serde_json::json!({"x": 1, "y": 2}));
    assert_eq!(Point::from_json_value(value).unwrap(), Point { x: 1, y: 2 });
}

#[derive(Debug, PartialEq, Record)]
struct Chain {
    label: String,
    #[record(flatten)]
    next: Box<Link>,
}

#[derive(Debug, PartialEq, Record)]
struct Link {
    weight: i64,
    #[record(flatten)]
    back: Box<Chain>,
}

#[test]
fn flatten_cycles_are_rejected() {
    assert!(
        matches!(Chain::schema(), Err(DefinitionError::Flatten { message, .. }) if message.contains("flattened into itself"))
    );
    assert!(matches!(Link::schema(), Err(DefinitionError::Flatten { .. })));
}
