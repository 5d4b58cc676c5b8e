//! Custom user-authored job behavior: dependency normalization,
//! pass-through content, and graph validation.

use camino::Utf8Path;

use awc::Compiler;
use awc::error::CompileError;

fn compile(content: &str) -> Result<awc::Compilation, CompileError> {
    Compiler::default().compile(Utf8Path::new("jobs-test.md"), content)
}

fn compile_lock(content: &str) -> serde_yaml::Value {
    serde_yaml::from_str(&compile(content).unwrap().lock).unwrap()
}

#[test]
fn missing_needs_rewrites_to_activation() {
    let lock = compile_lock(
        "---\non: issues\njobs:\n  deploy:\n    runs-on: ubuntu-latest\n    steps:\n      - run: ./deploy.sh\n---\nWork.\n",
    );
    assert_eq!(lock["jobs"]["deploy"]["needs"], "activation");
}

#[test]
fn explicit_needs_preserved() {
    let lock = compile_lock(
        "---\non: issues\njobs:\n  first:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo one\n  second:\n    needs: first\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo two\n---\nWork.\n",
    );
    assert_eq!(lock["jobs"]["second"]["needs"], "first");
}

#[test]
fn job_content_passes_through_verbatim() {
    // Custom jobs are opaque: permissions, env, strategy, anything the
    // user wrote survives untouched. Env values are deliberately NOT
    // run through the expression safety engine.
    let lock = compile_lock(
        "---\non: issues\njobs:\n  custom:\n    runs-on: ubuntu-latest\n    permissions:\n      deployments: write\n    env:\n      MY_SECRET: ${{ secrets.DEPLOY_KEY }}\n    strategy:\n      matrix:\n        os: [ubuntu, macos]\n    steps:\n      - run: echo hi\n---\nWork.\n",
    );

    let custom = &lock["jobs"]["custom"];
    assert_eq!(custom["permissions"]["deployments"], "write");
    assert_eq!(custom["env"]["MY_SECRET"], "${{ secrets.DEPLOY_KEY }}");
    assert_eq!(custom["strategy"]["matrix"]["os"][0], "ubuntu");
}

#[test]
fn unknown_dependency_rejected() {
    let err = compile(
        "---\non: issues\njobs:\n  deploy:\n    needs: nonexistent\n    runs-on: ubuntu-latest\n    steps:\n      - run: x\n---\nWork.\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("unknown job `nonexistent`"), "got: {err}");
}

#[test]
fn dependency_cycle_rejected() {
    let err = compile(
        "---\non: issues\njobs:\n  a:\n    needs: b\n    runs-on: ubuntu-latest\n    steps:\n      - run: x\n  b:\n    needs: a\n    runs-on: ubuntu-latest\n    steps:\n      - run: x\n---\nWork.\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("cycle"), "got: {err}");
}

#[test]
fn reserved_names_rejected() {
    for name in ["agent", "activation", "safe_outputs", "create_issue"] {
        let content = format!(
            "---\non: issues\njobs:\n  {name}:\n    runs-on: ubuntu-latest\n    steps:\n      - run: x\n---\nWork.\n"
        );
        let err = compile(&content).unwrap_err();
        assert!(err.to_string().contains("reserved"), "{name}: {err}");
    }
}

#[test]
fn pre_activation_hooked_job_runs_before_activation() {
    let lock = compile_lock(
        "---\non: issues\njobs:\n  precompute:\n    needs: pre_activation\n    runs-on: ubuntu-latest\n    outputs:\n      plan: ${{ steps.p.outputs.plan }}\n    steps:\n      - id: p\n        run: echo \"plan=fix\" >> \"$GITHUB_OUTPUT\"\n---\nFollow ${{ needs.precompute.outputs.plan }}.\n",
    );

    let needs: Vec<&str> = lock["jobs"]["activation"]["needs"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(needs.contains(&"precompute"), "{needs:?}");
}
