#![cfg(unix)]

use ripstation::interrupt;

#[test]
fn first_interrupt_becomes_a_quit_request() {
    interrupt::install();
    assert!(!interrupt::requested());

    // SAFETY: the handler installed above only sets a flag.
    let rc = unsafe { libc::raise(libc::SIGINT) };
    assert_eq!(rc, 0);
    assert!(interrupt::requested());
}
