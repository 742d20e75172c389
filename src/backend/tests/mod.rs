mod tests_memory;
