//! Benchmarks the lex -> parse -> type-analysis pipeline end to end on a
//! handful of representative snippets.

use duskscript_frontend::host::NullHost;
use duskscript_frontend::parser::ParserConfig;
use duskscript_frontend::Compilation;

const SMALL: &str = "local x = 1\nlocal y = x + 2\nreturn x + y";

const LOOP_HEAVY: &str = "
function sum_range(lo, hi):num
  local total = 0
  for i in {lo..hi} do
    total += i
  end
  return total
end
return sum_range(1, 1000)
";

const CHOOSE_AND_PIPE: &str = "
function classify(n)
  return choose n {
    < 0 -> \"negative\",
    0 -> \"zero\",
    > 0 -> \"positive\",
  }
end

local values = {1, -2, 0, 7, -9}
local labels = values |> classify
return labels
";

fn run(src: &str) {
    let mut compilation = Compilation::new(ParserConfig::default());
    let host = NullHost::default();
    compilation.compile("bench.ds", src, &host);
}

#[divan::bench]
fn small_chunk() {
    run(divan::black_box(SMALL));
}

#[divan::bench]
fn loop_heavy() {
    run(divan::black_box(LOOP_HEAVY));
}

#[divan::bench]
fn choose_and_pipe() {
    run(divan::black_box(CHOOSE_AND_PIPE));
}

fn main() {
    divan::main();
}
