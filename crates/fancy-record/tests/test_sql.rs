use expect_test::expect;
use fancy_record::{
    DefinitionError, Error, Record, Row, SqlRecord, SqlType, Value,
};
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq, Record)]
struct Author {
    name: String,
    #[record(default)]
    born: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Record)]
struct Book {
    #[record(unique)]
    isbn: String,
    title: String,
    #[record(default = 9.99)]
    price: f64,
    #[record(default = true)]
    in_print: bool,
    #[record(default)]
    tags: Vec<String>,
    author: Author,
    #[record(sql = false, default)]
    cached: String,
}

#[derive(Debug, PartialEq, Record)]
#[record(table = "labels")]
struct Label {
    #[record(primary_key)]
    slug: String,
    title: String,
}

#[derive(Debug, PartialEq, Record)]
struct UsesRowId {
    _id: i64,
}

#[derive(Debug, PartialEq, Record)]
struct MaybeAuthor {
    author: Option<Author>,
}

fn book() -> Book {
    Book {
        isbn: "978-0".to_string(),
        title: "Dune".to_string(),
        price: 9.99,
        in_print: true,
        tags: vec!["sf".to_string(), "classic".to_string()],
        author: Author {
            name: "Frank Herbert".to_string(),
            born: None,
        },
        cached: "ignored".to_string(),
    }
}

#[test]
fn create_table_statement() {
    let sql = Book::create_table_sql().unwrap();
    expect![[r#"
        CREATE TABLE IF NOT EXISTS "book" (
            "_id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "isbn" TEXT NOT NULL UNIQUE,
            "title" TEXT NOT NULL,
            "price" REAL NOT NULL DEFAULT 9.99,
            "in_print" BOOLEAN NOT NULL DEFAULT TRUE,
            "tags" TEXT NOT NULL DEFAULT '[]',
            "name" TEXT NOT NULL,
            "born" INTEGER
        )"#]]
    .assert_eq(&sql);
}

#[test]
fn declared_primary_key_replaces_row_id() {
    let table = Label::table_schema().unwrap();
    assert_eq!(table.name, "labels");
    assert!(table.column("_id").is_none());
    let slug = table.column("slug").unwrap();
    assert!(slug.primary_key);
    assert_eq!(slug.sql_type, SqlType::Text);
    assert_eq!(
        table.insert_sql(),
        r#"INSERT INTO "labels" ("slug", "title") VALUES (?, ?)"#
    );
}

#[test]
fn rows_spread_nested_records_and_encode_lists_as_json() {
    let row = book().to_row().unwrap();
    assert_eq!(
        row.keys().collect::<Vec<_>>(),
        ["isbn", "title", "price", "in_print", "tags", "name", "born"]
    );
    assert_eq!(row["tags"], Value::from(r#"["sf","classic"]"#));
    assert_eq!(row["in_print"], Value::Bool(true));
    assert_eq!(row["born"], Value::Null);
}

#[test]
fn rows_read_back_driver_values() {
    let mut row: Row = book().to_row().unwrap();
    row.insert("_id".to_string(), Value::Int(1));
    row.insert("in_print".to_string(), Value::Int(1));
    row.shift_remove("born");

    let back = Book::from_row(&row).unwrap();
    assert_eq!(
        back,
        Book {
            cached: String::new(),
            ..book()
        }
    );
}

#[test]
fn malformed_json_column_is_reported_at_the_column() {
    let mut row = book().to_row().unwrap();
    row.insert("tags".to_string(), Value::from("[oops"));
    match Book::from_row(&row).unwrap_err() {
        Error::Conversion(err) => assert_eq!(err.path(), ["tags"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn row_id_column_name_is_reserved() {
    assert!(matches!(
        UsesRowId::table_schema(),
        Err(Error::Definition(DefinitionError::Sql { .. }))
    ));
}

#[test]
fn optional_nested_records_have_no_columns() {
    let err = MaybeAuthor::table_schema().unwrap_err();
    assert!(
        matches!(&err, Error::Definition(DefinitionError::Sql { message, .. }) if message.contains("author")),
        "{err}"
    );
}

#[derive(Debug, PartialEq, Record)]
struct Byline {
    name: String,
    author: Author,
}

#[test]
fn rows_are_checked_against_the_table_layout() {
    let maybe = MaybeAuthor {
        author: Some(book().author),
    };
    assert!(matches!(
        maybe.to_row(),
        Err(Error::Definition(DefinitionError::Sql { .. }))
    ));

    let byline = Byline {
        name: "Preface".to_string(),
        author: book().author,
    };
    let err = byline.to_row().unwrap_err();
    assert!(err.to_string().contains("duplicate column `name`"), "{err}");
}
