use std::collections::BTreeMap;

use fancy_record::{JsonRecord, Record, TomlRecord};
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq, Record)]
struct Item {
    label: String,
    weight: f64,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Inventory {
    owner: String,
    #[record(default = 0)]
    count: u32,
    note: Option<String>,
    #[record(default)]
    tags: Vec<String>,
    items: Vec<Item>,
    #[record(default)]
    totals: BTreeMap<String, i64>,
}

fn item() -> impl Strategy<Value = Item> {
    ("\\PC{0,12}", -1.0e6..1.0e6f64).prop_map(|(label, weight)| Item { label, weight })
}

fn inventory() -> impl Strategy<Value = Inventory> {
    (
        "\\PC{0,16}",
        any::<u32>(),
        proptest::option::of("\\PC{0,8}"),
        proptest::collection::vec("[a-z]{1,6}", 0..4),
        proptest::collection::vec(item(), 0..4),
        proptest::collection::btree_map("[a-z_]{1,6}", any::<i64>(), 0..4),
    )
        .prop_map(|(owner, count, note, tags, items, totals)| Inventory {
            owner,
            count,
            note,
            tags,
            items,
            totals,
        })
}

proptest! {
    #[test]
    fn mapping_round_trip(value in inventory()) {
        let mapping = value.to_mapping().unwrap();
        prop_assert_eq!(Inventory::from_mapping(&mapping).unwrap(), value);
    }

    #[test]
    fn json_round_trip(value in inventory()) {
        let text = value.to_json_string().unwrap();
        prop_assert_eq!(Inventory::from_json_str(&text).unwrap(), value);
    }

    #[test]
    fn toml_round_trip(value in inventory()) {
        let text = value.to_toml_string().unwrap();
        prop_assert_eq!(Inventory::from_toml_str(&text).unwrap(), value);
    }
}
