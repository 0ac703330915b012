use strata_core::{BuildContext, Error};
use tempfile::TempDir;

fn python_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("requirements.txt"), "jinja2==3.1.4\n").unwrap();
    std::fs::write(tmp.path().join("main.py"), "print('hi')\n").unwrap();
    std::fs::create_dir_all(tmp.path().join("templates/mail")).unwrap();
    std::fs::write(tmp.path().join("templates/default.jinja"), "{{ event.name }}").unwrap();
    tmp
}

#[test]
fn open_fails_for_missing_directory() {
    let tmp = TempDir::new().unwrap();
    let result = BuildContext::open(&tmp.path().join("nope"));
    assert!(matches!(result, Err(Error::ContextNotFound { .. })));
}

#[test]
fn resolve_existing_file_and_directory() {
    let tmp = python_project();
    let ctx = BuildContext::open(tmp.path()).unwrap();

    let manifest = ctx.resolve("requirements.txt").unwrap();
    assert!(manifest.is_file());
    assert!(manifest.starts_with(ctx.root()));

    let templates = ctx.resolve("templates/").unwrap();
    assert!(templates.is_dir());
    assert!(templates.ends_with("templates"));
}

#[test]
fn resolve_missing_input_names_it() {
    let tmp = python_project();
    std::fs::remove_file(tmp.path().join("main.py")).unwrap();
    let ctx = BuildContext::open(tmp.path()).unwrap();

    let err = ctx.resolve("main.py").unwrap_err();
    assert!(matches!(err, Error::MissingInput { ref name, .. } if name == "main.py"));
    assert!(err.to_string().contains("main.py"));
}

#[test]
fn resolve_rejects_parent_escape() {
    let tmp = python_project();
    let ctx = BuildContext::open(tmp.path()).unwrap();

    let result = ctx.resolve("../etc/passwd");
    assert!(matches!(result, Err(Error::OutsideContext { .. })));
}

#[test]
fn resolve_rejects_absolute_path() {
    let tmp = python_project();
    let ctx = BuildContext::open(tmp.path()).unwrap();

    let result = ctx.resolve("/etc/passwd");
    assert!(matches!(result, Err(Error::OutsideContext { .. })));
}

#[test]
fn require_all_stops_at_first_missing() {
    let tmp = python_project();
    let ctx = BuildContext::open(tmp.path()).unwrap();

    let ok = ctx
        .require_all(["requirements.txt", "main.py", "templates"])
        .unwrap();
    assert_eq!(ok.len(), 3);

    let err = ctx
        .require_all(["requirements.txt", "static", "main.py"])
        .unwrap_err();
    assert!(err.to_string().contains("static"), "got: {err}");
}
