use crate::plan::{BuildPlan, Operation, StageBase};

/// Renders a [`BuildPlan`] as a multi-stage Dockerfile.
pub struct DockerfileGenerator<'a> {
    plan: &'a BuildPlan,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(plan: &'a BuildPlan) -> Self {
        Self { plan }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        for (index, stage) in self.plan.stages().iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let from = match &stage.base {
                StageBase::Image(reference) => reference.as_str(),
                StageBase::Stage(parent) => parent.as_str(),
            };
            out.push_str(&format!(
                "# === Stage {n}: {title} ===\n",
                n = index + 1,
                title = title_case(&stage.name),
            ));
            out.push_str(&format!("FROM {from} AS {name}\n", name = stage.name));

            for op in &stage.operations {
                out.push_str(&directive(op));
                out.push('\n');
            }
        }

        out
    }
}

fn directive(op: &Operation) -> String {
    match op {
        Operation::Workdir { path } => format!("WORKDIR {path}"),
        Operation::Copy { src, dest } => format!("COPY {src} {dest}"),
        Operation::Run { argv } => format!("RUN {}", shell_join(argv)),
        Operation::Mkdir { path } => format!("RUN mkdir -p {}", shell_quote(path)),
        Operation::Cmd { argv } => format!("CMD {}", exec_form(argv)),
    }
}

/// JSON array form, so the command runs without a shell.
fn exec_form(argv: &[String]) -> String {
    let quoted: Vec<String> = argv
        .iter()
        .map(|arg| format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,".contains(c));
    if plain {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
