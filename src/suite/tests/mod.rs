mod tests_report;
