use std::process::Command;

use assembler::{
    AssembleError, Assembler, BlockSet, UniqueCounter, collect_required_code, resolve,
};
use mdx::block::{Block, Stream};

fn document(source: &str) -> BlockSet {
    let doc = mdx::parser::Parser::new(source.to_string(), 0)
        .parse()
        .expect("parse failed");
    BlockSet::from_document(&doc).expect("duplicate blocks")
}

fn script(blocks: &BlockSet, name: &str) -> Vec<String> {
    collect_required_code(blocks, name, &UniqueCounter::new()).expect("assembly failed")
}

/// Run assembled lines with bash and return what they print.
fn run(lines: &[String]) -> String {
    let output = Command::new("bash")
        .arg("-c")
        .arg(lines.join("\n"))
        .env("HOME", "/home/tester")
        .output()
        .expect("bash not available");
    assert!(output.status.success(), "script failed: {:?}", output);
    String::from_utf8(output.stdout).unwrap()
}

const FRUIT: &str = r#"# Fruit

```yaml :(fruit.yml)
- apple
- banana
```

```bash :summarize_fruits +(fruit.yml)
sort
```

```vars :[env]
COLOR: red
GREETING: "hello there"
```

```bash :report %(summarize_fruits <fruit.yml >$fruit_summary) +[env]
this body is ignored
```

```bash :show +report
echo "$COLOR: $fruit_summary"
```
"#;

#[test]
fn call_block_end_to_end() {
    let blocks = document(FRUIT);
    assert_eq!(
        script(&blocks, "show"),
        vec![
            "export COLOR=red",
            r"export GREETING=hello\ there",
            "cat > 'fruit.yml' <<\"EOF\"",
            "- apple",
            "- banana",
            "EOF",
            "summarize_fruits() {",
            "sort",
            "}",
            "export fruit_summary=$(summarize_fruits < 'fruit.yml')",
            "echo \"$COLOR: $fruit_summary\"",
        ]
    );
}

#[test]
fn shared_dependency_is_emitted_once() {
    let blocks = document(
        "```bash :base\nBASE=1\n```\n\n```bash :left +base\nL=1\n```\n\n\
         ```bash :right +base\nR=1\n```\n\n```bash :top +left +right\necho done\n```\n",
    );
    assert_eq!(
        script(&blocks, "top"),
        vec!["BASE=1", "L=1", "R=1", "echo done"]
    );
}

#[test]
fn call_without_output_is_a_bare_invocation() {
    let blocks = BlockSet::new(vec![
        Block::new("greet", &["echo hi"]),
        Block::new("main", &[]).with_call("(greet)"),
    ])
    .unwrap();
    assert_eq!(script(&blocks, "main"), vec!["greet() {", "echo hi", "}", "greet"]);
}

#[test]
fn call_reads_from_a_variable_and_writes_a_file() {
    let blocks = BlockSet::new(vec![
        Block::new("count words", &["wc -w"]),
        Block::new("main", &[]).with_call("(count words <$text >counts.txt)"),
    ])
    .unwrap();
    assert_eq!(
        script(&blocks, "main"),
        vec![
            "count_words() {",
            "wc -w",
            "}",
            "count_words <<<\"$text\" > 'counts.txt'",
        ]
    );
}

#[test]
fn call_parameters_are_expanded() {
    let blocks = BlockSet::new(vec![
        Block::new("list", &["echo \"$LABEL\" \"$DIR\""]),
        Block::new("main", &[]).with_call(
            r#"(list DIR:cl="ls -la" WHO:lc=world HOME_DIR:ve=HOME LABEL=files >$listing)"#,
        ),
    ])
    .unwrap();
    assert_eq!(
        script(&blocks, "main"),
        vec![
            "list() {",
            "echo \"$LABEL\" \"$DIR\"",
            "}",
            "DIR_1=$(ls -la)",
            r#"export listing=$(DIR="${DIR_1}" WHO="$(printf %s "world")" HOME_DIR="${HOME}" LABEL=files list)"#,
        ]
    );
}

#[test]
fn heredoc_targets() {
    let to_file = Block::new("(config)", &["a: 1"]).with_stdout(Stream::File("app.yml".into()));
    let to_var = Block::new("(template)", &["Dear $NAME"]).with_stdout(Stream::Variable("LETTER".into()));
    let plain = Block::new("(notes.txt)", &["line"]);
    let main = Block::new("main", &["true"]).with_reqs(&["(config)", "(template)", "(notes.txt)"]);
    let blocks = BlockSet::new(vec![to_file, to_var, plain, main]).unwrap();

    assert_eq!(
        script(&blocks, "main"),
        vec![
            "cat > 'app.yml' <<\"EOF\"",
            "a: 1",
            "EOF",
            "export LETTER=$(cat <<\"EOF\"",
            "Dear $NAME",
            "EOF",
            ")",
            "cat > 'notes.txt' <<\"EOF\"",
            "line",
            "EOF",
            "true",
        ]
    );
}

#[test]
fn shell_block_output_capture() {
    let to_var = Block::new("count", &["ls | wc -l"]).with_stdout(Stream::Variable("TOTAL".into()));
    let to_file = Block::new("log", &["date", "uptime"]).with_stdout(Stream::File("run.log".into()));
    let main = Block::new("main", &["echo $TOTAL"]).with_reqs(&["count", "log"]);
    let blocks = BlockSet::new(vec![to_var, to_file, main]).unwrap();

    assert_eq!(
        script(&blocks, "main"),
        vec![
            "export TOTAL=$(",
            "ls | wc -l",
            ")",
            "{",
            "date",
            "uptime",
            "} > 'run.log'",
            "echo $TOTAL",
        ]
    );
}

#[test]
fn hidden_and_disabled_blocks_are_assembled_when_required() {
    let mut hidden = Block::new("secret", &["S=1"]);
    hidden.hidden = true;
    let mut disabled = Block::new("legacy", &["L=1"]);
    disabled.disabled = true;
    let main = Block::new("main", &["run"]).with_reqs(&["secret", "legacy"]);
    let blocks = BlockSet::new(vec![hidden, disabled, main]).unwrap();
    assert_eq!(script(&blocks, "main"), vec!["S=1", "L=1", "run"]);
}

#[test]
fn counter_advances_across_assemblies() {
    let blocks = BlockSet::new(vec![
        Block::new("t", &[]),
        Block::new("main", &[]).with_call("(t X:cv=date)"),
    ])
    .unwrap();
    let counter = UniqueCounter::new();
    let order = resolve(&blocks, "main").unwrap();
    let assembler = Assembler::new(&counter);
    let first = assembler.assemble(&order).unwrap();
    let second = assembler.assemble(&order).unwrap();
    assert_eq!(first[2], "X_1=$(date)");
    assert_eq!(second[2], "X_2=$(date)");
}

#[test]
fn staged_parameters_pass_their_values() {
    let blocks = BlockSet::new(vec![
        Block::new("greet", &["echo \"[$WHO] [$TAG]\""]),
        Block::new("main", &[]).with_call(r#"(greet WHO:lv="hello world" TAG:cv="echo tagged")"#),
    ])
    .unwrap();
    let lines = script(&blocks, "main");
    assert_eq!(
        lines[3..],
        [
            r"WHO_1=hello\ world",
            "TAG_2=$(echo tagged)",
            r#"WHO="${WHO_1}" TAG="${TAG_2}" greet"#,
        ]
    );
    assert_eq!(run(&lines), "[hello world] [tagged]\n");
}

#[test]
fn literal_parameters_are_not_expanded_by_the_shell() {
    let blocks = BlockSet::new(vec![
        Block::new("show", &["echo \"[$A] [$B] [$C]\""]),
        Block::new("main", &[]).with_call(r#"(show A:q=$HOME B:ll="it's mine" C=`date`)"#),
    ])
    .unwrap();
    let lines = script(&blocks, "main");
    assert_eq!(
        lines.last().unwrap(),
        r"A=\$HOME B=it\'s\ mine C=\`date\` show"
    );
    assert_eq!(run(&lines), "[$HOME] [it's mine] [`date`]\n");
}

#[test]
fn expression_parameters_are_expanded_by_the_shell() {
    let blocks = BlockSet::new(vec![
        Block::new("show", &["echo \"[$DIR]\""]),
        Block::new("main", &[]).with_call("(show DIR:le=$HOME/src)"),
    ])
    .unwrap();
    let lines = script(&blocks, "main");
    assert_eq!(lines.last().unwrap(), r#"DIR="$HOME/src" show"#);
    assert_eq!(run(&lines), "[/home/tester/src]\n");
}

#[test]
fn required_call_target_also_runs_in_place() {
    let blocks = BlockSet::new(vec![
        Block::new("setup", &["X=ready"]),
        Block::new("a", &["echo \"a sees [$X]\""]).with_reqs(&["setup"]),
        Block::new("main", &[]).with_reqs(&["a"]).with_call("(setup)"),
    ])
    .unwrap();
    let lines = script(&blocks, "main");
    assert_eq!(
        lines,
        vec![
            "setup() {",
            "X=ready",
            "}",
            "setup",
            "echo \"a sees [$X]\"",
            "setup",
        ]
    );
    assert_eq!(run(&lines), "a sees [ready]\n");
}

#[test]
fn call_targets_sharing_a_function_name_are_rejected() {
    let blocks = BlockSet::new(vec![
        Block::new("a-b", &["echo dash"]),
        Block::new("a_b", &["echo underscore"]),
        Block::new("x", &[]).with_call("(a-b)"),
        Block::new("y", &[]).with_call("(a_b)"),
        Block::new("main", &["true"]).with_reqs(&["x", "y"]),
    ])
    .unwrap();
    let err = collect_required_code(&blocks, "main", &UniqueCounter::new()).unwrap_err();
    assert_eq!(
        err,
        AssembleError::FunctionNameClash {
            function: "a_b".into(),
            first: "a-b".into(),
            second: "a_b".into(),
        }
    );
}

#[test]
fn repeated_calls_to_one_target_share_its_function() {
    let blocks = BlockSet::new(vec![
        Block::new("hi", &["echo hi"]),
        Block::new("x", &[]).with_call("(hi)"),
        Block::new("main", &[]).with_reqs(&["x"]).with_call("(hi >$greeting)"),
    ])
    .unwrap();
    assert_eq!(
        script(&blocks, "main"),
        vec!["hi() {", "echo hi", "}", "hi", "export greeting=$(hi)"]
    );
}
