use fancy_record::{DefinitionError, Error, Record, SubprocessRecord};
use pretty_assertions::assert_eq;

#[derive(Debug, Default, PartialEq, Record)]
#[record(exec = "ls")]
struct Listing {
    #[record(args("-l"), default)]
    long: bool,
    #[record(args("-a"), default)]
    all: bool,
    #[record(default)]
    sort: Option<String>,
    #[record(args("paths"), default)]
    paths: Vec<String>,
}

#[derive(Debug, PartialEq, Record)]
struct Compress {
    #[record(exec)]
    program: Option<String>,
    #[record(default = 6)]
    level: i64,
    #[record(subprocess_exclude, default)]
    note: String,
    #[record(args(), default)]
    hidden: String,
    output: Output,
}

#[derive(Debug, PartialEq, Record)]
struct Output {
    #[record(args("-o", "--output"))]
    path: String,
    #[record(default)]
    keep: bool,
}

#[derive(Debug, PartialEq, Record)]
struct NoProgram {
    x: i64,
}

#[derive(Debug, PartialEq, Record)]
#[record(exec = "cat")]
struct TwoPrograms {
    #[record(exec)]
    program: String,
}

#[derive(Debug, PartialEq, Record)]
#[record(exec = "echo")]
struct Echo {
    #[record(args("words"))]
    words: Vec<String>,
}

fn compress(level: i64) -> Compress {
    Compress {
        program: Some("gzip".to_string()),
        level,
        note: "not passed".to_string(),
        hidden: "not passed either".to_string(),
        output: Output {
            path: "out.gz".to_string(),
            keep: true,
        },
    }
}

#[test]
fn class_executable_with_flags_and_positionals() {
    let listing = Listing {
        long: true,
        all: false,
        sort: Some("time".to_string()),
        paths: vec!["/tmp".to_string(), "/var".to_string()],
    };
    assert_eq!(
        listing.get_args(false).unwrap(),
        ["ls", "-l", "--sort", "time", "/tmp", "/var"]
    );
    assert_eq!(Listing::default().get_args(false).unwrap(), ["ls"]);
}

#[test]
fn executable_can_come_from_a_field() {
    let args = compress(9).get_args(false).unwrap();
    assert_eq!(args, ["gzip", "--level", "9", "-o", "out.gz", "--keep"]);
}

#[test]
fn defaults_can_be_suppressed() {
    assert_eq!(&compress(6).get_args(false).unwrap()[1..3], ["--level", "6"]);
    assert_eq!(
        compress(6).get_args(true).unwrap(),
        ["gzip", "-o", "out.gz", "--keep"]
    );
}

#[test]
fn missing_executable_is_an_error() {
    let unset = Compress {
        program: None,
        ..compress(1)
    };
    assert_eq!(unset.get_executable().unwrap(), None);
    match unset.get_args(false).unwrap_err() {
        Error::Subprocess(message) => assert_eq!(message, "no executable identified for `Compress`"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        NoProgram { x: 1 }.get_args(false),
        Err(Error::Subprocess(_))
    ));
}

#[test]
fn class_and_field_executables_conflict() {
    assert!(matches!(
        TwoPrograms::schema(),
        Err(DefinitionError::Subprocess { .. })
    ));
}

#[test]
fn command_is_ready_to_spawn() {
    let command = compress(9).command().unwrap();
    assert_eq!(command.get_program(), "gzip");
    assert_eq!(command.get_args().count(), 5);
}

#[cfg(unix)]
#[test]
fn output_is_captured() {
    let echo = Echo {
        words: vec!["hello".to_string(), "world".to_string()],
    };
    let output = echo.run_subprocess_output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello world\n");
}
