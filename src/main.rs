use vm16::bytecode::Radix;
use vm16::memory::{Ram, ADDRESS_SPACE_SIZE};
use vm16::{process_module, Cpu, MemoryMapper, StopToken};

/// Counts a word in memory down from ten while adding three to `r2` each time around.
const COUNTDOWN: &str = "
start:
  mov $0A, &0050
loop:
  mov &0050, acc
  dec acc
  mov acc, &0050
  inc r2
  inc r2
  inc r2
  jne $00, &[!loop]
end:
  hlt
";

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  #[cfg(feature = "trace_execution")]
  println!("Execution Tracing ENABLED");

  let module = match process_module(COUNTDOWN, 0x0000) {
    Ok(module) => module,
    Err(error) => {
      eprintln!("Assembly failed: {}", error);
      std::process::exit(1);
    }
  };
  println!("{}\n", module);
  println!("Binary:\n{}\n", module.render(Radix::Binary));

  let mut memory = MemoryMapper::new();
  memory.map(Box::new(Ram::new(ADDRESS_SPACE_SIZE as usize)), 0x0000, ADDRESS_SPACE_SIZE, true);

  let mut cpu = Cpu::new(memory);
  let result  = cpu
    .memory_mut()
    .load(module.load_offset, &module.machine_code)
    .and_then(|_| cpu.run(&StopToken::new()));

  match result {
    Ok(state) => println!("Finished: {:?}\n{}", state, cpu),
    Err(error) => {
      eprintln!("Execution failed: {}\n{}", error, cpu);
      std::process::exit(1);
    }
  }
}
