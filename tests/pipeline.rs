use std::io::Write;
use std::process::{Command, Stdio};

use coord_eval::eval::SingularMatrixError;
use coord_eval::parse::SemanticError;
use coord_eval::solve::Matrix;
use coord_eval::{Config, Evaluation};
use pretty_assertions::assert_eq;

fn run(input: &str) -> miette::Result<Option<Evaluation>> {
    coord_eval::run(Some("pipeline.tex"), input.as_bytes(), Config::default())
}

fn evaluate(input: &str) -> Evaluation {
    match run(input) {
        Ok(Some(evaluation)) => evaluation,
        Ok(None) => panic!("no eval request in:\n{input}"),
        Err(e) => panic!("pipeline failed: {e:?}"),
    }
}

fn vector(name: &str, x: i64, y: i64) -> String {
    format!("\\vec{{{name}}} = \\begin{{pmatrix}} {x} \\\\ {y} \\end{{pmatrix}}\n")
}

fn basis_vector(basis: &str, index: usize, x: i64, y: i64) -> String {
    format!("\\vec{{{basis}}}_{index} = \\begin{{pmatrix}} {x} \\\\ {y} \\end{{pmatrix}}\n")
}

fn basis(name: &str) -> String {
    format!("{name} = \\{{ \\vec{{{name}}}_1, \\vec{{{name}}}_2 \\}}\n")
}

const CHANGE_OF_BASIS: &str = r"
; standard basis
\vec{b}_1 = \begin{pmatrix} 1 \\ 0 \end{pmatrix}
\vec{b}_2 = \begin{pmatrix} 0 \\ 1 \end{pmatrix}
b = \{ \vec{b}_1, \vec{b}_2 \}
\vec{v} = \begin{pmatrix} 3 \\ 4 \end{pmatrix}
[\vec{v}]_b \leftarrow \text{eval}
";

const IDENTITY_TRANSFORM: &str = r"
\vec{b}_1 = \begin{pmatrix} 1 \\ 0 \end{pmatrix}
\vec{b}_2 = \begin{pmatrix} 0 \\ 1 \end{pmatrix}
b = \{ \vec{b}_1, \vec{b}_2 \}
\vec{c}_1 = \begin{pmatrix} 1 \\ 0 \end{pmatrix}
\vec{c}_2 = \begin{pmatrix} 0 \\ 1 \end{pmatrix}
c = \{ \vec{c}_1, \vec{c}_2 \}
T(\vec{b}_1) = 1*\vec{c}_1 + 0*\vec{c}_2
T(\vec{b}_2) = 0*\vec{c}_1 + 1*\vec{c}_2
\vec{v} = \begin{pmatrix} 5 \\ 7 \end{pmatrix}
T(\vec{v}) \leftarrow \text{eval}
";

#[test]
fn change_of_basis_end_to_end() {
    let evaluation = evaluate(CHANGE_OF_BASIS);
    assert_eq!(evaluation.to_string(), r"[\vec{v}]_b = (3 4)");
}

#[test]
fn identity_transform_end_to_end() {
    let evaluation = evaluate(IDENTITY_TRANSFORM);
    assert_eq!(evaluation.to_string(), r"T(\vec{v}) = (5 7)");
}

#[test]
fn standard_basis_leaves_coordinates_unchanged() {
    for (x, y) in [(0, 0), (3, 4), (-2, 9), (100, -100), (1, -1)] {
        let input = format!(
            "{}{}{}{}[\\vec{{v}}]_b \\leftarrow \\text{{eval}}\n",
            basis_vector("b", 1, 1, 0),
            basis_vector("b", 2, 0, 1),
            basis("b"),
            vector("v", x, y),
        );
        assert_eq!(evaluate(&input).result, vec![x as f64, y as f64]);
    }
}

#[test]
fn solved_coordinates_reproduce_the_vector() {
    let bases = [((2, 1), (1, 3)), ((0, 1), (1, 0)), ((1, 1), (-1, 1)), ((7, -3), (2, 5))];
    for ((a, b), (c, d)) in bases {
        for (x, y) in [(3, 4), (-5, 2), (11, -13)] {
            let input = format!(
                "{}{}{}{}[\\vec{{v}}]_b \\leftarrow \\text{{eval}}\n",
                basis_vector("b", 1, a, b),
                basis_vector("b", 2, c, d),
                basis("b"),
                vector("v", x, y),
            );
            let coordinates = evaluate(&input).result;
            let first = [a as f64, b as f64];
            let second = [c as f64, d as f64];
            let matrix = Matrix::from_columns(&[&first, &second]).unwrap();
            let back = matrix.mul_vec(&coordinates);
            assert!((back[0] - x as f64).abs() < 1e-9, "{back:?} vs ({x}, {y})");
            assert!((back[1] - y as f64).abs() < 1e-9, "{back:?} vs ({x}, {y})");
        }
    }
}

#[test]
fn negated_basis_prints_unsigned_zeros() {
    let input = format!(
        "{}{}{}{}[\\vec{{v}}]_b \\leftarrow \\text{{eval}}\n",
        basis_vector("b", 1, -1, 0),
        basis_vector("b", 2, 0, -1),
        basis("b"),
        vector("v", 0, 0),
    );
    assert_eq!(evaluate(&input).to_string(), r"[\vec{v}]_b = (0 0)");
}

#[test]
fn multiples_are_singular() {
    let input = format!(
        "{}{}{}{}[\\vec{{v}}]_b \\leftarrow \\text{{eval}}\n",
        basis_vector("b", 1, 1, 2),
        basis_vector("b", 2, 2, 4),
        basis("b"),
        vector("v", 1, 1),
    );
    let e = run(&input).unwrap_err();
    assert!(e.downcast_ref::<SingularMatrixError>().is_some(), "{e:?}");
}

#[test]
fn identity_transform_up_to_relabeling() {
    // b1 -> c2 and b2 -> c1 swaps the coordinates
    let rules = "T(\\vec{b}_1) = \\vec{c}_2\nT(\\vec{b}_2) = \\vec{c}_1\n";
    for (x, y) in [(5, 7), (-1, 0), (4, 4)] {
        let input = format!(
            "{}{}{}{}{}{}{rules}{}T(\\vec{{v}}) \\leftarrow \\text{{eval}}\n",
            basis_vector("b", 1, 1, 0),
            basis_vector("b", 2, 0, 1),
            basis("b"),
            basis_vector("c", 1, 1, 0),
            basis_vector("c", 2, 0, 1),
            basis("c"),
            vector("v", x, y),
        );
        assert_eq!(evaluate(&input).result, vec![y as f64, x as f64]);
    }
}

#[test]
fn multi_letter_basis_is_a_semantic_error() {
    let input = format!("{}{}", basis_vector("bb", 1, 1, 0), basis("bb"));
    let e = run(&input).unwrap_err();
    assert!(e.downcast_ref::<SemanticError>().is_some(), "{e:?}");
}

#[test]
fn reads_from_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CHANGE_OF_BASIS.as_bytes()).unwrap();

    let reader = std::io::BufReader::new(std::fs::File::open(file.path()).unwrap());
    let evaluation = coord_eval::run(file.path().to_str(), reader, Config::default())
        .unwrap()
        .unwrap();
    assert_eq!(evaluation.result, vec![3.0, 4.0]);
}

fn cli(args: &[&str], input: &str) -> std::process::Output {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(input.as_bytes()).unwrap();
    Command::new(env!("CARGO_BIN_EXE_coord-eval"))
        .args(args)
        .arg(file.path())
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn cli_stdin(args: &[&str], input: &[u8]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_coord-eval"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(input).unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn cli_reads_stdin_without_a_file() {
    for args in [&["eval"][..], &["eval", "-"][..]] {
        let output = cli_stdin(args, CHANGE_OF_BASIS.as_bytes());
        assert!(output.status.success(), "{args:?}: {output:?}");
        assert_eq!(
            String::from_utf8_lossy(&output.stdout),
            "[\\vec{v}]_b = (3 4)\n"
        );
    }
}

#[test]
fn cli_unreadable_input_exits_74() {
    let mut input = CHANGE_OF_BASIS.as_bytes().to_vec();
    input.extend_from_slice(b"\xff\xfe\n");
    let output = cli_stdin(&["eval"], &input);
    assert_eq!(output.status.code(), Some(74), "{output:?}");
}

#[test]
fn cli_honours_a_bare_rust_log_level() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CHANGE_OF_BASIS.as_bytes()).unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_coord-eval"))
        .args(["eval"])
        .arg(file.path())
        .env("RUST_LOG", "debug")
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("VEC_ASSIGN v (3 4)"), "{stderr}");
}

#[test]
fn cli_prints_the_result() {
    let output = cli(&["eval"], IDENTITY_TRANSFORM);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "T(\\vec{v}) = (5 7)\n"
    );
}

#[test]
fn cli_exit_codes() {
    let output = cli(&["eval"], "this is not a statement\n");
    assert_eq!(output.status.code(), Some(65));

    let singular = format!(
        "{}{}{}{}[\\vec{{v}}]_b \\leftarrow \\text{{eval}}\n",
        basis_vector("b", 1, 1, 2),
        basis_vector("b", 2, 2, 4),
        basis("b"),
        vector("v", 1, 1),
    );
    let output = cli(&["eval"], &singular);
    assert_eq!(output.status.code(), Some(70));
}

#[test]
fn cli_custom_comment_marker() {
    let input = format!("# defined below\n{CHANGE_OF_BASIS}");
    let output = cli(&["--comment", "#", "--comment", ";", "eval"], &input);
    assert!(output.status.success(), "{output:?}");
}

#[test]
fn cli_tokenize() {
    let output = cli(&["tokenize"], CHANGE_OF_BASIS);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "VEC_ASSIGN b1 (1 0)\nVEC_ASSIGN b2 (0 1)\nBASIS_ASSIGN b {b1, b2}\nVEC_ASSIGN v (3 4)\nEVAL_CHANGE_BASIS v b\n"
    );
}
