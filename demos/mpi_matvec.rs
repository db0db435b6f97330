//! End-to-end check of the distributed multiplication under MPI.
//!
//! Exercises the transport primitives (broadcast_vector, scatter_rows,
//! gather_partials) on their own, then the full coordinator run on the
//! staircase matrix, on random inputs with a non-zero root, and on a
//! duplicated communicator.
//! A custom panic hook calls `std::process::abort()` to prevent MPI hangs.
//!
//! Run with: mpiexec -n 4 ./target/debug/examples/mpi_matvec

use ferromatvec::{
    broadcast_vector, gather_partials, multiply_sequential, run, scatter_rows, Collective,
    DistributionTable, Inputs, Kernel, Matrix, Mpi, RunConfig, ThreadLevel,
};

fn main() {
    let mpi = Mpi::init_thread(ThreadLevel::Funneled).expect("MPI init failed");

    // Installed after init: some MPI implementations install their own hooks.
    // A rank that panics inside a collective would otherwise leave its peers
    // blocked forever.
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        std::process::abort();
    }));

    let world = mpi.world().expect("world communicator");
    let rank = world.rank();
    let size = world.size();

    assert!(size >= 2, "mpi_matvec requires at least 2 processes");
    if rank == 0 {
        println!("MPI thread level: {:?}", mpi.thread_level());
    }

    // ========================================================================
    // Test 1: broadcast_vector
    // ========================================================================
    {
        let x = (rank == 0).then(|| vec![1.5f64, -2.0, 3.25]);
        let x = broadcast_vector(&world, x, 3, 0).expect("broadcast_vector failed");
        assert_eq!(x, vec![1.5, -2.0, 3.25], "rank {rank}: broadcast mismatch");
        if rank == 0 {
            println!("PASS: broadcast_vector");
        }
    }

    // ========================================================================
    // Test 2: scatter_rows + gather_partials round trip with sentinels
    // ========================================================================
    {
        let rows = 2 * size as usize + 1;
        let cols = 3;
        let table = DistributionTable::plan(rows, size).expect("plan failed");
        let full = (rank == 0).then(|| {
            Matrix::from_fn(rows, cols, |r, c| (r * 100 + c) as i64).expect("matrix")
        });

        let slice = scatter_rows(&world, full.as_ref(), &table, cols, 0).expect("scatter failed");
        let range = table.range(rank);
        assert_eq!(slice.rows(), range.len());
        for (local, global) in range.enumerate() {
            assert_eq!(slice.row(local)[0], (global * 100) as i64);
        }

        // Each worker returns the first column of its rows
        let partial: Vec<i64> = slice.iter_rows().map(|row| row[0]).collect();
        let gathered = gather_partials(&world, &partial, &table, 0).expect("gather failed");
        if rank == 0 {
            let expected: Vec<i64> = (0..rows).map(|r| (r * 100) as i64).collect();
            assert_eq!(gathered, Some(expected));
            println!("PASS: scatter_rows / gather_partials round trip");
        } else {
            assert!(gathered.is_none());
        }
    }

    // ========================================================================
    // Test 3: staircase matrix, M = 8, N = 4
    // ========================================================================
    {
        let config = RunConfig::new(8, 4);
        let inputs = (rank == 0).then(|| {
            Inputs::from_fn(8, 4, |r, _| (r + 1) as f64, |_| 1.0).expect("inputs")
        });
        let report = run(&world, &config, inputs).expect("run failed");
        if rank == 0 {
            let report = report.expect("root report");
            assert_eq!(report.y, vec![4.0, 8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 32.0]);
            println!(
                "PASS: staircase on {size} ranks ({:.6} s)",
                report.elapsed.as_secs_f64()
            );
        } else {
            assert!(report.is_none());
        }
    }

    // ========================================================================
    // Test 4: random inputs, last rank as coordinator, threaded kernel
    // ========================================================================
    {
        let root = size - 1;
        let config = RunConfig::new(101, 37)
            .with_root(root)
            .with_kernel(Kernel::Threaded { threads: 2 });
        let inputs = (rank == root).then(|| Inputs::random(101, 37, 7).expect("inputs"));
        let report = run(&world, &config, inputs).expect("run failed");
        if rank == root {
            let report = report.expect("root report");
            let reference = Inputs::random(101, 37, 7).expect("inputs");
            let expected =
                multiply_sequential(&reference.matrix, &reference.vector).expect("reference");
            assert_eq!(report.y, expected, "distributed result differs from sequential");
            println!("PASS: random 101x37 with root {root}");
        }
    }

    // ========================================================================
    // Test 5: duplicated communicator, timed with MPI_Wtime
    // ========================================================================
    {
        let dup = world.duplicate().expect("duplicate failed");
        assert_eq!((dup.rank(), dup.size()), (rank, size));

        let config = RunConfig::new(8, 4);
        let inputs = (rank == 0).then(|| {
            Inputs::from_fn(8, 4, |r, _| (r + 1) as i64, |_| 1).expect("inputs")
        });
        let start = Mpi::wtime();
        let report = run(&dup, &config, inputs).expect("run on duplicate failed");
        let seconds = Mpi::wtime() - start;
        assert!(seconds >= 0.0);
        if rank == 0 {
            assert_eq!(report.expect("root report").y, vec![4, 8, 12, 16, 20, 24, 28, 32]);
            println!("PASS: staircase on a duplicated communicator ({seconds:.6} s)");
        }
    }

    world.barrier().expect("barrier failed");
    if rank == 0 {
        println!("\n========================================");
        println!("All mpi_matvec tests passed!");
        println!("========================================");
    }
}
