use std::cell::RefCell;
use std::rc::Rc;

use crate::Coroutine;

fn counter(first: i64, last: i64) -> Coroutine<i64> {
    Coroutine::new(move |y| {
        for x in first..=last {
            let sent = y.suspend(x);
            assert_eq!(sent, x);
        }
        last - first
    })
    .unwrap()
}

// Collects everything a coroutine yields until it finishes, echoing each
// value back. Returns the yields and the return value.
fn drain(coroutine: &mut Coroutine<i64>) -> (Vec<i64>, i64) {
    let mut yields = vec![];
    let mut sent = 0;
    loop {
        let val = coroutine.resume(sent);
        if coroutine.finished() {
            return (yields, val);
        }
        yields.push(val);
        sent = val;
    }
}

#[test]
fn transparent() {
    let mut direct = counter(3, 7);
    let direct_result = drain(&mut direct);
    direct.close().unwrap();

    let mut outer = Coroutine::new(|y| {
        let mut inner = counter(3, 7);
        let ret = y.delegate(&mut inner);
        assert!(inner.started());
        assert!(inner.finished());
        assert_eq!(inner.return_value(), Some(&ret));
        inner.close().unwrap();
        ret
    })
    .unwrap();
    assert_eq!(drain(&mut outer), direct_result);
    outer.close().unwrap();
}

#[test]
fn values_reach_inner_unchanged() {
    let mut outer = Coroutine::<String>::new(|y| {
        let mut inner = Coroutine::new(|y| {
            let a = y.suspend("first".to_string());
            let b = y.suspend(format!("{a}!"));
            format!("{a}{b}")
        })
        .unwrap();
        let ret = y.delegate(&mut inner);
        inner.close().unwrap();
        y.suspend(ret.to_uppercase());
        "outer".to_string()
    })
    .unwrap();
    assert_eq!(outer.resume(String::new()), "first");
    assert_eq!(outer.resume("x".to_string()), "x!");
    assert_eq!(outer.resume("yz".to_string()), "XYZ");
    assert!(!outer.finished());
    assert_eq!(outer.resume(String::new()), "outer");
    assert!(outer.finished());
    outer.close().unwrap();
}

#[test]
fn delegate_three_times() {
    let mut outer = Coroutine::new(|y| {
        let mut total = 0;
        for _ in 0..3 {
            let mut inner = counter(5, 10);
            assert!(!inner.started());
            total += y.delegate(&mut inner);
            inner.close().unwrap();
        }
        total
    })
    .unwrap();

    let mut x = 0;
    for _ in 0..3 {
        for expected in 5..=10 {
            x = outer.resume(x);
            assert_eq!(x, expected);
            assert!(outer.started());
            assert!(!outer.finished());
        }
    }
    assert_eq!(outer.resume(x), 3 * (10 - 5));
    assert!(outer.finished());
    assert_eq!(outer.return_value(), Some(&15));
    assert_eq!(outer.resume(x), 0);
    outer.close().unwrap();
}

#[test]
fn nested() {
    let log = Rc::new(RefCell::new(vec![]));

    fn level(depth: i64, log: Rc<RefCell<Vec<i64>>>) -> Coroutine<i64> {
        Coroutine::new(move |y| {
            y.suspend(depth * 100);
            let inner_ret = if depth > 0 {
                let mut inner = level(depth - 1, log.clone());
                let ret = y.delegate(&mut inner);
                inner.close().unwrap();
                ret
            } else {
                0
            };
            log.borrow_mut().push(depth);
            y.suspend(depth * 100 + 1);
            inner_ret + depth
        })
        .unwrap()
    }

    let mut top = level(3, log.clone());
    let (yields, ret) = drain(&mut top);
    top.close().unwrap();

    // Levels start outermost first and finish innermost first.
    assert_eq!(yields, [300, 200, 100, 0, 1, 101, 201, 301]);
    assert_eq!(*log.borrow(), [0, 1, 2, 3]);
    assert_eq!(ret, 3 + 2 + 1);
}

#[test]
fn nested_flags() {
    let mut outer = Coroutine::new(|y| {
        let mut middle = Coroutine::new(|y| {
            let mut inner = counter(1, 2);
            let ret = y.delegate(&mut inner);
            inner.close().unwrap();
            ret * 10
        })
        .unwrap();
        let ret = y.delegate(&mut middle);
        assert!(middle.finished());
        middle.close().unwrap();
        ret + 1
    })
    .unwrap();
    assert_eq!(outer.resume(0), 1);
    assert!(outer.started());
    assert!(!outer.finished());
    assert_eq!(outer.resume(1), 2);
    assert_eq!(outer.resume(2), 11);
    assert!(outer.finished());
    outer.close().unwrap();
}

#[test]
fn delegate_to_finished() {
    let mut inner = counter(1, 1);
    assert_eq!(inner.resume(0), 1);
    assert_eq!(inner.resume(1), 0);
    assert!(inner.finished());

    let mut outer = Coroutine::new(move |y| {
        let ret = y.delegate(&mut inner);
        inner.close().unwrap();
        y.suspend(ret);
        7
    })
    .unwrap();
    assert_eq!(outer.resume(0), 0);
    assert!(!outer.finished());
    assert_eq!(outer.resume(0), 7);
    outer.close().unwrap();
}

#[test]
fn inner_owned_by_caller() {
    let inner = Rc::new(RefCell::new(Some(counter(4, 5))));
    let inner2 = inner.clone();
    let mut outer = Coroutine::new(move |y| {
        let mut coroutine = inner2.borrow_mut().take().unwrap();
        let ret = y.delegate(&mut coroutine);
        *inner2.borrow_mut() = Some(coroutine);
        ret
    })
    .unwrap();
    assert_eq!(drain(&mut outer), (vec![4, 5], 1));
    outer.close().unwrap();

    let inner = inner.borrow_mut().take().unwrap();
    assert!(inner.finished());
    assert_eq!(inner.return_value(), Some(&1));
    inner.close().unwrap();
}

#[cfg(feature = "unwind")]
#[test]
#[should_panic(expected = "inner failure")]
fn panic_in_inner() {
    use std::panic::{self, AssertUnwindSafe};

    let mut outer = Coroutine::<i32>::new(|y| {
        let mut inner = Coroutine::<i32>::new(|y| {
            y.suspend(1);
            panic!("inner failure");
        })
        .unwrap();
        let result = panic::catch_unwind(AssertUnwindSafe(|| y.delegate(&mut inner)));
        assert!(inner.finished());
        inner.close().unwrap();
        y.suspend(2);
        panic::resume_unwind(result.unwrap_err());
    })
    .unwrap();
    assert_eq!(outer.resume(0), 1);
    assert_eq!(outer.resume(0), 2);
    let result = panic::catch_unwind(AssertUnwindSafe(|| outer.resume(0)));
    assert!(outer.finished());
    outer.close().unwrap();
    panic::resume_unwind(result.unwrap_err());
}

#[cfg(feature = "unwind")]
#[test]
fn panic_crosses_two_levels() {
    use std::panic::{self, AssertUnwindSafe};

    let mut outer = Coroutine::<i32>::new(|y| {
        let mut middle = Coroutine::<i32>::new(|y| {
            let mut inner = Coroutine::<i32>::new(|y| {
                y.suspend(1);
                panic!("deep failure");
            })
            .unwrap();
            y.delegate(&mut inner)
        })
        .unwrap();
        y.delegate(&mut middle)
    })
    .unwrap();
    assert_eq!(outer.resume(0), 1);
    let result = panic::catch_unwind(AssertUnwindSafe(|| outer.resume(0)));
    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"deep failure"));
    assert!(outer.started());
    assert!(outer.finished());
    assert_eq!(outer.return_value(), None);
    assert_eq!(outer.resume(0), 0);
    outer.close().unwrap();
}
