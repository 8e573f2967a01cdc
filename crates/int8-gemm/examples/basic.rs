//! Basic example of quantized matrix multiplication.

use int8_gemm::prelude::*;

fn main() -> Result<(), GemmError> {
    println!("int8 GEMM - Basic Example\n");
    println!("{}\n", int8_gemm::version_info());

    // A small fully connected layer: 3 outputs, 4 inputs, batch of 2
    let weights = Tensor::matrix(
        3,
        4,
        vec![
            0.5f32, -1.0, 0.25, 2.0, // output 0
            1.5, 0.0, -0.5, 0.75, // output 1
            -2.0, 1.0, 1.0, -0.25, // output 2
        ],
    )?;
    let inputs = Tensor::matrix(
        4,
        2,
        vec![
            1.0f32, 0.5, // input 0
            -2.0, 1.0, // input 1
            0.5, -1.5, // input 2
            3.0, 2.0, // input 3
        ],
    )?;
    let bias = Tensor::matrix(3, 1, vec![0.1f32, -0.2, 0.3])?;

    println!("Weights W (3x4):");
    print_matrix(&weights);
    println!("\nInputs X (4x2):");
    print_matrix(&inputs);

    // Y = W · X + bias, one bias per output row
    let y = QuantizedGemm::new()
        .a_mode(QuantMode::PerRow)
        .bias(&bias, Broadcast::PerRow)
        .beta(1.0)
        .execute(&weights, &inputs)?;

    println!("\nY = W · X + b (int8, per-row weight scales):");
    print_matrix(&y);

    // Same product in f32 for comparison
    println!("\nf32 reference:");
    let exact = Tensor::from_fn(3, 2, |i, j| {
        (0..4)
            .map(|k| weights.at(i, k) * inputs.at(k, j))
            .sum::<f32>()
            + bias.at(i, 0)
    });
    print_matrix(&exact);

    let max_err = y
        .to_vec()
        .iter()
        .zip(exact.to_vec())
        .map(|(q, e)| (q - e).abs())
        .fold(0.0f32, f32::max);
    println!("\nmax abs error: {max_err:.4}");

    Ok(())
}

fn print_matrix(m: &Tensor<f32>) {
    for i in 0..m.rows() {
        print!("  [");
        for j in 0..m.cols() {
            if j > 0 {
                print!(", ");
            }
            print!("{:7.3}", m.at(i, j));
        }
        println!("]");
    }
}
