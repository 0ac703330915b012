use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mockall::mock;
use strata_build::engine::{BuildError, BuildOptions, Engine};
use strata_build::executor::{CommandExecutor, ExecError, RunOutput, RunSpec};
use strata_build::image::FinalImage;
use strata_build::plan::{BuildPlan, Operation, Stage, StageBase};
use strata_build::stages::{self, BASE_STAGE, CODE_STAGE};
use strata_build::store::LayerStore;
use strata_core::{BuildContext, StrataConfig};
use tempfile::TempDir;

mock! {
    Executor {}

    impl CommandExecutor for Executor {
        async fn run(&self, spec: &RunSpec) -> Result<RunOutput, ExecError>;
    }
}

/// Project directory plus cache and output locations inside it.
struct Fixture {
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::create_dir_all(dir.join("templates/partials")).unwrap();
        std::fs::write(dir.join("requirements.txt"), "jinja2==3.1.4\n").unwrap();
        std::fs::write(dir.join("main.py"), "print('v1')\n").unwrap();
        std::fs::write(dir.join("templates/default.jinja"), "<b>{{ event.name }}</b>").unwrap();
        std::fs::write(dir.join("templates/partials/footer.jinja"), [0u8, 159, 146, 150]).unwrap();
        Self { tmp }
    }

    fn dir(&self) -> &Path {
        self.tmp.path()
    }

    fn cache(&self) -> PathBuf {
        self.dir().join(".strata/cache")
    }

    fn output(&self) -> PathBuf {
        self.dir().join(".strata/image")
    }

    fn engine(&self, executor: MockExecutor) -> Engine<MockExecutor> {
        let ctx = BuildContext::open(self.dir()).unwrap();
        let store = LayerStore::open(&self.cache()).unwrap();
        Engine::with_executor(ctx, store, executor)
    }
}

fn default_plan() -> BuildPlan {
    stages::standard_plan(&StrataConfig::default()).unwrap()
}

const SITE_PACKAGES: &str = "usr/local/lib/python3/site-packages";

/// Executor that simulates `pip install` by dropping a package into the
/// staged rootfs' `site-packages`, outside the working directory.
fn installing_executor(expected_runs: usize) -> MockExecutor {
    let mut mock = MockExecutor::new();
    mock.expect_run()
        .withf(|spec| spec.argv.first().map(String::as_str) == Some("pip"))
        .times(expected_runs)
        .returning(|spec| {
            assert!(spec.cwd.join("requirements.txt").is_file());
            assert!(!spec.cwd.join("main.py").exists());
            let site = spec.rootfs.join(SITE_PACKAGES).join("jinja2");
            std::fs::create_dir_all(&site).unwrap();
            std::fs::write(site.join("__init__.py"), "").unwrap();
            Ok(RunOutput::default())
        });
    mock
}

fn list_dir(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn install_was_cached(report: &strata_build::BuildReport) -> bool {
    report.of_kind("run").all(|o| o.cached)
}

// ── Layout ──

#[tokio::test]
async fn final_image_has_expected_layout() {
    let fx = Fixture::new();
    let engine = fx.engine(installing_executor(1));

    let report = engine
        .build(&default_plan(), &fx.output(), &BuildOptions::default())
        .await
        .unwrap();
    let workdir = report.image.workdir_path();

    assert_eq!(
        list_dir(&workdir),
        vec!["data", "main.py", "requirements.txt", "templates"]
    );
    assert!(
        report
            .image
            .rootfs()
            .join(SITE_PACKAGES)
            .join("jinja2/__init__.py")
            .is_file()
    );
    assert!(list_dir(&workdir.join("data")).is_empty());
    assert_eq!(
        std::fs::read(workdir.join("main.py")).unwrap(),
        std::fs::read(fx.dir().join("main.py")).unwrap()
    );
    assert_eq!(
        std::fs::read(workdir.join("templates/partials/footer.jinja")).unwrap(),
        vec![0u8, 159, 146, 150]
    );
    assert_eq!(
        list_dir(&workdir.join("templates")),
        vec!["default.jinja", "partials"]
    );
}

#[tokio::test]
async fn final_image_metadata() {
    let fx = Fixture::new();
    let engine = fx.engine(installing_executor(1));

    let report = engine
        .build(&default_plan(), &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    let image = FinalImage::load(&fx.output()).unwrap();
    assert_eq!(image.config, report.image.config);
    assert_eq!(image.config.workdir, "/app");
    assert_eq!(
        image.config.cmd,
        Some(vec!["python".to_owned(), "main.py".to_owned()])
    );
    assert_eq!(image.config.base_image, "python:3-slim");
    assert_eq!(image.config.stages, vec!["base", "code", "runner"]);
    // manifest, install, main.py, templates, data
    assert_eq!(image.config.layers.len(), 5);
}

#[tokio::test]
async fn command_is_never_executed_at_build_time() {
    let fx = Fixture::new();
    let mut mock = installing_executor(1);
    mock.expect_run()
        .withf(|spec| spec.argv.first().map(String::as_str) == Some("python"))
        .never();
    let engine = fx.engine(mock);

    engine
        .build(&default_plan(), &fx.output(), &BuildOptions::default())
        .await
        .unwrap();
}

// ── Cache reuse ──

#[tokio::test]
async fn second_build_reuses_install_layer() {
    let fx = Fixture::new();
    let plan = default_plan();

    let first = fx
        .engine(installing_executor(1))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();
    assert!(!install_was_cached(&first));
    assert_eq!(first.cached_count(), 0);

    let second = fx
        .engine(installing_executor(0))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();
    assert!(install_was_cached(&second));
    assert_eq!(second.built_count(), 0);
    assert!(second.image.rootfs().join(SITE_PACKAGES).join("jinja2").is_dir());
}

#[tokio::test]
async fn entrypoint_change_keeps_install_layer() {
    let fx = Fixture::new();
    let plan = default_plan();

    fx.engine(installing_executor(1))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    std::fs::write(fx.dir().join("main.py"), "print('v2')\n").unwrap();

    let report = fx
        .engine(installing_executor(0))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    assert!(install_was_cached(&report));
    let code_copies: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.stage == CODE_STAGE)
        .collect();
    assert!(!code_copies[0].cached, "main.py must be recopied");
    // keys chain from the parent, so later layers are rebuilt too
    assert!(!code_copies[1].cached);
    assert_eq!(
        std::fs::read_to_string(report.image.workdir_path().join("main.py")).unwrap(),
        "print('v2')\n"
    );
}

#[tokio::test]
async fn manifest_change_reruns_install() {
    let fx = Fixture::new();
    let plan = default_plan();

    fx.engine(installing_executor(1))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    std::fs::write(fx.dir().join("requirements.txt"), "jinja2\nicalendar\n").unwrap();

    let report = fx
        .engine(installing_executor(1))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();
    assert!(!install_was_cached(&report));
}

#[tokio::test]
async fn no_cache_rebuilds_every_layer() {
    let fx = Fixture::new();
    let plan = default_plan();

    fx.engine(installing_executor(1))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    let report = fx
        .engine(installing_executor(1))
        .build(&plan, &fx.output(), &BuildOptions { no_cache: true })
        .await
        .unwrap();
    assert_eq!(report.cached_count(), 0);
    assert_eq!(report.built_count(), 5);
}

// ── Idempotent directory creation ──

#[tokio::test]
async fn mkdir_twice_leaves_one_directory() {
    let fx = Fixture::new();
    let plan = BuildPlan::new()
        .with_stage(
            Stage::new("runner", StageBase::Image("python:3-slim".to_owned()))
                .op(Operation::Workdir {
                    path: "/app".to_owned(),
                })
                .op(Operation::Mkdir {
                    path: "data".to_owned(),
                })
                .op(Operation::Mkdir {
                    path: "data".to_owned(),
                }),
        )
        .unwrap();

    let report = fx
        .engine(MockExecutor::new())
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(list_dir(&report.image.workdir_path()), vec!["data"]);
    assert!(list_dir(&report.image.workdir_path().join("data")).is_empty());
}

#[tokio::test]
async fn mkdir_creates_parents() {
    let fx = Fixture::new();
    let plan = BuildPlan::new()
        .with_stage(
            Stage::new("runner", StageBase::Image("python:3-slim".to_owned()))
                .op(Operation::Workdir {
                    path: "/srv/app".to_owned(),
                })
                .op(Operation::Mkdir {
                    path: "var/lib/data".to_owned(),
                }),
        )
        .unwrap();

    let report = fx
        .engine(MockExecutor::new())
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    assert!(report.image.rootfs().join("srv/app/var/lib/data").is_dir());
}

// ── Failures ──

#[tokio::test]
async fn failed_install_aborts_before_code_stage() {
    let fx = Fixture::new();
    let mut mock = MockExecutor::new();
    mock.expect_run().times(1).returning(|spec| {
        Err(ExecError::CommandFailed {
            argv: spec.argv.clone(),
            status: "exit status: 1".to_owned(),
            stderr: "ERROR: No matching distribution found for not-a-real-package".to_owned(),
        })
    });

    let err = fx
        .engine(mock)
        .build(&default_plan(), &fx.output(), &BuildOptions::default())
        .await
        .unwrap_err();

    match &err {
        BuildError::Operation { stage, index, op, .. } => {
            assert_eq!(stage, BASE_STAGE);
            assert_eq!(*index, 2);
            assert!(op.starts_with("RUN pip install"), "got: {op}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.output().exists(), "no image may be produced");

    // only the manifest layer was committed
    let store = LayerStore::open(&fx.cache()).unwrap();
    assert_eq!(store.layers().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_templates_fail_code_stage() {
    let fx = Fixture::new();
    std::fs::remove_dir_all(fx.dir().join("templates")).unwrap();

    let err = fx
        .engine(installing_executor(1))
        .build(&default_plan(), &fx.output(), &BuildOptions::default())
        .await
        .unwrap_err();

    match &err {
        BuildError::Operation { stage, op, .. } => {
            assert_eq!(stage, CODE_STAGE);
            assert!(op.contains("templates"), "got: {op}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.output().exists());
}

#[tokio::test]
async fn failed_build_keeps_previous_image() {
    let fx = Fixture::new();
    let plan = default_plan();

    fx.engine(installing_executor(1))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    std::fs::remove_file(fx.dir().join("main.py")).unwrap();
    let result = fx
        .engine(installing_executor(0))
        .build(&plan, &fx.output(), &BuildOptions::default())
        .await;

    assert!(result.is_err());
    let image = FinalImage::load(&fx.output()).unwrap();
    assert!(image.workdir_path().join("main.py").is_file());
}

// ── Environment ──

#[tokio::test]
async fn local_env_expands_rootfs() {
    let fx = Fixture::new();
    let mut mock = MockExecutor::new();
    mock.expect_run()
        .withf(|spec| {
            let target = &spec.env["PIP_TARGET"];
            target.starts_with(&*spec.rootfs.to_string_lossy()) && target.ends_with("/site")
        })
        .times(1)
        .returning(|_| Ok(RunOutput::default()));

    let mut env = BTreeMap::new();
    env.insert("PIP_TARGET".to_owned(), "{rootfs}/site".to_owned());
    let engine = fx.engine(mock).with_env(env);

    engine
        .build(&default_plan(), &fx.output(), &BuildOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn install_changes_outside_workdir_are_captured() {
    let fx = Fixture::new();
    let mut mock = MockExecutor::new();
    mock.expect_run().times(1).returning(|spec| {
        let site = spec.rootfs.join("usr/local/lib/python3/site-packages/requests");
        std::fs::create_dir_all(&site).unwrap();
        std::fs::write(site.join("__init__.py"), "").unwrap();
        Ok(RunOutput::default())
    });

    let report = fx
        .engine(mock)
        .build(&default_plan(), &fx.output(), &BuildOptions::default())
        .await
        .unwrap();

    assert!(report
        .image
        .rootfs()
        .join("usr/local/lib/python3/site-packages/requests/__init__.py")
        .is_file());
}
